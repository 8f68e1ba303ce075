//! Triggering Engine (§4.G): applies the planner's output. Obeys a global
//! rate limit for the capacity-constrained lane (test jobs), invokes the
//! build service, and persists the trigger record under the application
//! lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::planner::{self, Candidate};
use super::Trigger;
use crate::build_service::{BuildJob, BuildServiceError};
use crate::context::PlanningContext;
use crate::domain::{ApplicationId, JobRun, JobType};

impl Trigger {
    /// Pools every application's ready candidates, applies the
    /// capacity-constrained and production lanes, and returns the number of
    /// jobs actually dispatched. Failures for one application are isolated:
    /// they are logged and do not abort the sweep (§7).
    pub async fn trigger_ready_jobs(&self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let ctx = self.planning_context(now);
        let applications = self.repository.as_list().await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_applications));
        let mut plan_tasks = tokio::task::JoinSet::new();
        for application in applications {
            let permit = semaphore.clone();
            let ctx = ctx.clone();
            plan_tasks.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closes");
                planner::ready_jobs(&ctx, &application)
            });
        }

        let mut all_candidates = Vec::new();
        while let Some(result) = plan_tasks.join_next().await {
            match result {
                Ok(candidates) => all_candidates.extend(candidates),
                Err(e) => warn!(error = %e, "planner task panicked"),
            }
        }

        let (test_candidates, production_candidates): (Vec<_>, Vec<_>) =
            all_candidates.into_iter().partition(|c| c.job_type.is_test());

        let mut dispatched = 0;
        dispatched += self.trigger_capacity_constrained_lane(test_candidates, now).await;
        dispatched += self.trigger_production_lane(production_candidates, now).await;
        dispatched
    }

    /// Sorts by `(isRetry, isApplicationUpgrade)` descending then
    /// `availableSince` ascending, groups by job type, and triggers at most
    /// one candidate per job type per invocation.
    async fn trigger_capacity_constrained_lane(&self, mut candidates: Vec<Candidate>, now: chrono::DateTime<chrono::Utc>) -> usize {
        candidates.sort_by(|a, b| {
            b.is_retry
                .cmp(&a.is_retry)
                .then(b.is_application_upgrade.cmp(&a.is_application_upgrade))
                .then(a.available_since.cmp(&b.available_since))
        });

        let mut picked: HashMap<JobType, Candidate> = HashMap::new();
        for candidate in candidates {
            picked.entry(candidate.job_type.clone()).or_insert(candidate);
        }

        let mut dispatched = 0;
        for candidate in picked.into_values() {
            if self.trigger(candidate, now).await {
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Groups by application and triggers every eligible candidate,
    /// preserving the per-application step order the planner produced them
    /// in. Different applications are dispatched concurrently.
    async fn trigger_production_lane(&self, candidates: Vec<Candidate>, now: chrono::DateTime<chrono::Utc>) -> usize {
        let mut by_application: HashMap<ApplicationId, Vec<Candidate>> = HashMap::new();
        for candidate in candidates {
            by_application.entry(candidate.application_id.clone()).or_default().push(candidate);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_applications));
        let mut tasks = tokio::task::JoinSet::new();
        for (_app_id, ordered_candidates) in by_application {
            let permit = semaphore.clone();
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closes");
                let mut count = 0;
                for candidate in ordered_candidates {
                    if this.trigger(candidate, now).await {
                        count += 1;
                    }
                }
                count
            });
        }

        let mut dispatched = 0;
        while let Some(result) = tasks.join_next().await {
            dispatched += result.unwrap_or(0);
        }
        dispatched
    }

    /// Dispatches a single candidate to the build service and, on success,
    /// records `lastTriggered` under the application lock. On `NotFound` /
    /// `IllegalArgument` the application's project id is cleared to
    /// quarantine it. Returns whether the job was actually dispatched.
    pub(super) async fn trigger(&self, candidate: Candidate, now: chrono::DateTime<chrono::Utc>) -> bool {
        let Some(project_id) = self.project_id_for(&candidate.application_id).await else {
            return false;
        };

        let build_job = BuildJob {
            application_id: candidate.application_id.clone(),
            project_id,
            job_name: candidate.job_type.canonical_name(),
        };

        match self.build_service.trigger(&build_job).await {
            Ok(()) => {
                let run = JobRun {
                    platform: candidate.versions.target_platform.clone(),
                    application: candidate.versions.target_application.clone(),
                    source_platform: candidate.versions.source_platform.clone(),
                    source_application: candidate.versions.source_application.clone(),
                    reason: candidate.reason.clone(),
                    at: now,
                };
                let job_type = candidate.job_type.clone();
                let result = self
                    .repository
                    .lock_or_throw(&candidate.application_id, |app| {
                        app.record_trigger(job_type.clone(), run.clone());
                        Ok(())
                    })
                    .await;
                if let Err(e) = result {
                    warn!(application = %candidate.application_id, error = %e, "failed to persist trigger record");
                    return false;
                }
                info!(application = %candidate.application_id, job_type = %candidate.job_type, "Triggered job");
                true
            }
            Err(BuildServiceError::NotFound(_)) | Err(BuildServiceError::IllegalArgument(_)) => {
                warn!(
                    target: "audit",
                    application = %candidate.application_id,
                    job_type = %candidate.job_type,
                    "Build service rejected job; quarantining application"
                );
                let _ = self
                    .repository
                    .lock_or_throw(&candidate.application_id, |app| {
                        app.project_id = None;
                        Ok(())
                    })
                    .await;
                false
            }
            Err(BuildServiceError::Transient(reason)) => {
                warn!(
                    application = %candidate.application_id,
                    job_type = %candidate.job_type,
                    reason = %reason,
                    "Transient build service failure; will retry next sweep"
                );
                false
            }
        }
    }

    async fn project_id_for(&self, id: &ApplicationId) -> Option<String> {
        self.repository.get(id).await.and_then(|app| app.project_id)
    }

    pub(super) fn planning_context(&self, now: chrono::DateTime<chrono::Utc>) -> PlanningContext {
        PlanningContext::new(now, self.system_platform_version.clone(), self.job_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_service::FakeBuildService;
    use crate::domain::application::{ApplicationId, Zone};
    use crate::domain::deployment_steps::{DeploymentSpec, StepNode};
    use crate::domain::{Application, Change, PlatformVersion};
    use crate::repository::ApplicationRepository;
    use std::sync::Arc;

    fn trigger_with(build_service: Arc<FakeBuildService>) -> Trigger {
        Trigger::new(
            Arc::new(ApplicationRepository::new()),
            build_service,
            PlatformVersion::new("1.0"),
            chrono::Duration::hours(12),
            32,
        )
    }

    fn spec_with_zone() -> DeploymentSpec {
        DeploymentSpec {
            tests: true,
            steps: vec![
                StepNode::TestStage,
                StepNode::Zone(Zone {
                    env: "prod".into(),
                    region: "us-east-1".into(),
                }),
            ],
            block_windows: vec![],
        }
    }

    #[tokio::test]
    async fn capacity_constrained_lane_triggers_at_most_one_per_job_type() {
        let build_service = Arc::new(FakeBuildService::new());
        let trigger = trigger_with(build_service.clone());

        for i in 0..5 {
            let id = ApplicationId::new("acme", format!("web-{i}"));
            let mut app = Application::new(id, spec_with_zone(), Some("proj".into()));
            app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
            trigger.repository.insert(app).await;
        }

        let now = chrono::Utc::now();
        let dispatched = trigger.trigger_ready_jobs(now).await;

        // One systemTest across all five applications, plus nothing else yet
        // (the zone step hasn't been tested).
        assert_eq!(dispatched, 1);
        assert_eq!(build_service.triggered().len(), 1);
        assert_eq!(build_service.triggered()[0].job_name, "systemTest");
    }

    #[tokio::test]
    async fn production_lane_dispatches_independent_applications_in_full() {
        let build_service = Arc::new(FakeBuildService::new());
        let trigger = trigger_with(build_service.clone());

        for i in 0..3 {
            let id = ApplicationId::new("acme", format!("web-{i}"));
            let mut app = Application::new(id.clone(), spec_with_zone(), Some("proj".into()));
            app.current_change = Change::of_platform(PlatformVersion::new("7.3"));

            let run = JobRun {
                platform: PlatformVersion::new("7.3"),
                application: crate::domain::ApplicationVersion::unknown(),
                source_platform: None,
                source_application: None,
                reason: "pre-tested".into(),
                at: chrono::Utc::now() - chrono::Duration::minutes(5),
            };
            app.deployment_jobs.insert(
                JobType::SystemTest,
                crate::domain::JobStatus {
                    last_success: Some(run.clone()),
                    last_completed: Some(run.at),
                    ..Default::default()
                },
            );
            app.deployment_jobs.insert(
                JobType::StagingTest,
                crate::domain::JobStatus {
                    last_success: Some(run.clone()),
                    last_completed: Some(run.at),
                    ..Default::default()
                },
            );
            trigger.repository.insert(app).await;
        }

        let now = chrono::Utc::now();
        let dispatched = trigger.trigger_ready_jobs(now).await;

        assert_eq!(dispatched, 3);
        assert_eq!(build_service.triggered().len(), 3);
        assert!(build_service.triggered().iter().all(|j| j.job_name.starts_with("production:")));
    }

    #[tokio::test]
    async fn unknown_job_rejection_quarantines_application() {
        let build_service = Arc::new(FakeBuildService::new());
        build_service.fail_unknown("systemTest");
        let trigger = trigger_with(build_service.clone());

        let id = ApplicationId::new("acme", "web");
        let mut app = Application::new(id.clone(), spec_with_zone(), Some("proj".into()));
        app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
        trigger.repository.insert(app).await;

        let dispatched = trigger.trigger_ready_jobs(chrono::Utc::now()).await;
        assert_eq!(dispatched, 0);

        let app = trigger.repository.require(&id).await.unwrap();
        assert!(app.project_id.is_none());
    }

    #[tokio::test]
    async fn second_sweep_with_no_completions_dispatches_nothing_more() {
        let build_service = Arc::new(FakeBuildService::new());
        let trigger = trigger_with(build_service.clone());

        let id = ApplicationId::new("acme", "web");
        let mut app = Application::new(id, spec_with_zone(), Some("proj".into()));
        app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
        trigger.repository.insert(app).await;

        let now = chrono::Utc::now();
        let first = trigger.trigger_ready_jobs(now).await;
        assert_eq!(first, 1);

        let second = trigger.trigger_ready_jobs(now).await;
        assert_eq!(second, 0);
    }
}
