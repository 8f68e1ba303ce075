//! External-Change API (§4.I): entry points to start, cancel, or
//! force-trigger a change; enforces the one-change-in-progress invariant.

use std::collections::HashMap;

use super::planner::{self, Candidate};
use super::Trigger;
use crate::build_service::BuildJob;
use crate::domain::{is_tested, ApplicationId, Change, JobRun, JobType, Versions};
use crate::error::{Result, TriggerError};

impl Trigger {
    /// Fails with `ChangeConflict` if a change is already in progress and
    /// the application has no job failures (the pipeline is healthy — don't
    /// disturb it). Otherwise installs `change` as current.
    pub async fn trigger_change(&self, id: &ApplicationId, change: Change) -> Result<()> {
        self.repository
            .lock_or_throw(id, |app| {
                let healthy = app.deployment_jobs.values().all(|status| status.last_error.is_none());
                if app.current_change.is_present() && healthy {
                    return Err(TriggerError::ChangeConflict { application: app.id.clone() });
                }

                if change.application_version.is_some() {
                    app.outstanding_change = None;
                }
                app.current_change = change.clone();
                Ok(())
            })
            .await
    }

    /// Sets the current change to its application-only portion when
    /// `keep_application_change`, otherwise clears it entirely.
    pub async fn cancel_change(&self, id: &ApplicationId, keep_application_change: bool) -> Result<()> {
        self.repository
            .lock_or_throw(id, |app| {
                app.current_change = if keep_application_change {
                    app.current_change.without_platform()
                } else {
                    Change::empty()
                };
                Ok(())
            })
            .await
    }

    /// Bypasses readiness checks entirely. For a component job, dispatches
    /// directly. For a test or production job on untested Versions,
    /// synthesizes the required test-job triggers first. Returns every job
    /// type actually dispatched, in dispatch order.
    pub async fn force_trigger(
        &self,
        id: &ApplicationId,
        job_type: JobType,
        user: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<JobType>> {
        let application = self.repository.require(id).await?;
        let project_id = application.project_id.clone().ok_or_else(|| TriggerError::IllegalJob {
            job_type: job_type.to_string(),
        })?;

        tracing::warn!(target: "audit", application = %id, job_type = %job_type, user = %user, "Force-triggering job");

        if job_type == JobType::Component {
            self.dispatch_forced(id, &project_id, JobType::Component, build_component_versions(&application), now)
                .await?;
            return Ok(vec![JobType::Component]);
        }

        let deployment = application.deployment_for(&job_type);
        let versions = Versions::from(
            &application.current_change,
            &application,
            deployment,
            &self.system_platform_version,
        );

        let mut dispatched = Vec::new();
        if job_type.is_production() && !is_tested(&application, &versions) {
            for test_job in planner::missing_tests(&application, &versions) {
                self.dispatch_forced(id, &project_id, test_job.clone(), versions.clone(), now).await?;
                dispatched.push(test_job);
            }
        }

        self.dispatch_forced(id, &project_id, job_type.clone(), versions, now).await?;
        dispatched.push(job_type);
        Ok(dispatched)
    }

    async fn dispatch_forced(
        &self,
        id: &ApplicationId,
        project_id: &str,
        job_type: JobType,
        versions: Versions,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let build_job = BuildJob {
            application_id: id.clone(),
            project_id: project_id.to_string(),
            job_name: job_type.canonical_name(),
        };
        self.build_service.trigger(&build_job).await.map_err(map_build_service_error)?;

        let run = JobRun {
            platform: versions.target_platform,
            application: versions.target_application,
            source_platform: versions.source_platform,
            source_application: versions.source_application,
            reason: "forced by operator".to_string(),
            at: now,
        };
        self.repository
            .lock_or_throw(id, |app| {
                app.record_trigger(job_type.clone(), run.clone());
                Ok(())
            })
            .await
    }

    /// Diagnostic snapshot of what the planner would emit for `id` at `now`,
    /// grouped by job type.
    pub async fn jobs_to_run(&self, id: &ApplicationId, now: chrono::DateTime<chrono::Utc>) -> Result<HashMap<String, Vec<Candidate>>> {
        let application = self.repository.require(id).await?;
        let ctx = self.planning_context(now);
        let candidates = planner::ready_jobs(&ctx, &application);

        let mut by_job_type: HashMap<String, Vec<Candidate>> = HashMap::new();
        for candidate in candidates {
            by_job_type.entry(candidate.job_type.canonical_name()).or_default().push(candidate);
        }
        Ok(by_job_type)
    }
}

fn build_component_versions(application: &crate::domain::Application) -> Versions {
    Versions {
        target_platform: application
            .baseline_platform_version()
            .unwrap_or_else(|| crate::domain::PlatformVersion::new("unknown")),
        target_application: application.baseline_application_version(),
        source_platform: None,
        source_application: None,
    }
}

fn map_build_service_error(e: crate::build_service::BuildServiceError) -> TriggerError {
    use crate::build_service::BuildServiceError::*;
    match e {
        NotFound(job) => TriggerError::UnknownJob { job_type: job },
        IllegalArgument(job) => TriggerError::IllegalJob { job_type: job },
        Transient(reason) => TriggerError::TransientBuildService(reason),
    }
}
