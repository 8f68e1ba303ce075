//! Completion Reconciler (§4.H): on receipt of a job completion report,
//! updates job status, advances or rolls back the application's change, and
//! schedules follow-up decisions by recomputing `remainingChange`.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::Trigger;
use crate::domain::{remaining_change, ApplicationVersion, Change, Deployment, JobReport, JobRun, JobType};
use crate::error::{Result, TriggerError};

impl Trigger {
    /// `notifyOfCompletion`. If the application is unknown, logs and drops
    /// the report rather than failing the caller — the build service's
    /// webhook has no one to retry to.
    pub async fn notify_of_completion(&self, report: JobReport, now: DateTime<Utc>) -> Result<()> {
        let ctx = self.planning_context(now);
        let application_id = report.application_id.clone();

        let outcome = self
            .repository
            .lock_if_present(&application_id, move |app| {
                if report.job_type == JobType::Component {
                    apply_component_completion(app, &report, now);
                } else {
                    apply_job_completion(app, &report, now)?;
                }

                app.current_change = remaining_change(&ctx, app);
                if !app.current_change.is_present() {
                    if let Some(outstanding) = app.outstanding_change.take() {
                        app.current_change = outstanding;
                    }
                }
                Ok(())
            })
            .await;

        match outcome {
            None => {
                warn!(application = %application_id, "Completion report for unknown application; dropping");
                Ok(())
            }
            Some(result) => {
                if let Ok(()) = &result {
                    info!(application = %application_id, "Applied completion report");
                }
                result
            }
        }
    }
}

fn apply_component_completion(app: &mut crate::domain::Application, report: &JobReport, now: DateTime<Utc>) {
    let application_version = match (&report.source_revision, report.build_number) {
        (Some(revision), Some(build_number)) => ApplicationVersion::from_build(revision.clone(), build_number),
        _ => ApplicationVersion::unknown(),
    };

    // The component job is externally initiated (the build service, not this
    // trigger, decides when to run it), so there is no prior `lastTriggered`
    // to rely on: synthesize one now.
    let run = JobRun {
        platform: app.baseline_platform_version().unwrap_or_else(|| crate::domain::PlatformVersion::new("unknown")),
        application: application_version.clone(),
        source_platform: None,
        source_application: None,
        reason: "external component build".to_string(),
        at: now,
    };
    app.record_trigger(JobType::Component, run.clone());

    match &report.error {
        None => {
            app.record_completion(JobType::Component, now, Some(run), None);
            if accept_new_application_version(app) {
                app.current_change = app.current_change.with_application(application_version);
                app.outstanding_change = None;
            } else {
                app.outstanding_change = Some(Change::of_application(application_version));
            }
        }
        Some(error) => {
            app.record_completion(JobType::Component, now, None, Some(*error));
        }
    }
}

fn apply_job_completion(app: &mut crate::domain::Application, report: &JobReport, now: DateTime<Utc>) -> Result<()> {
    let last_triggered = app
        .status_of(&report.job_type)
        .and_then(|s| s.last_triggered.clone())
        .ok_or_else(|| {
            TriggerError::InvariantViolation(format!(
                "completion received for {} on {} with no prior trigger",
                report.job_type, app.id
            ))
        })?;

    if report.error.is_none() {
        if let JobType::Production(zone) = &report.job_type {
            app.deployments.insert(
                zone.clone(),
                Deployment {
                    platform_version: last_triggered.platform.clone(),
                    application_version: last_triggered.application.clone(),
                    timestamp: now,
                },
            );
        }
    }

    let success_run = report.error.is_none().then_some(last_triggered);
    app.record_completion(report.job_type.clone(), now, success_run, report.error);
    Ok(())
}

/// Accept if an application-version change is already in flight (stacking is
/// safe), or the application has any job failures on record (accept fixes),
/// or there is no platform change in flight.
fn accept_new_application_version(app: &crate::domain::Application) -> bool {
    if app.current_change.application_version.is_some() {
        return true;
    }
    if app.deployment_jobs.values().any(|status| status.last_error.is_some()) {
        return true;
    }
    app.current_change.platform_version.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_service::FakeBuildService;
    use crate::domain::application::{ApplicationId, Zone};
    use crate::domain::deployment_steps::{DeploymentSpec, StepNode};
    use crate::domain::{Application, PlatformVersion};
    use crate::repository::ApplicationRepository;
    use std::sync::Arc;

    fn trigger() -> Trigger {
        Trigger::new(
            Arc::new(ApplicationRepository::new()),
            Arc::new(FakeBuildService::new()),
            PlatformVersion::new("1.0"),
            chrono::Duration::hours(12),
            32,
        )
    }

    fn spec() -> DeploymentSpec {
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
    async fn unknown_application_is_dropped_not_errored() {
        let trigger = trigger();
        let report = JobReport {
            application_id: ApplicationId::new("acme", "ghost"),
            project_id: None,
            job_type: JobType::SystemTest,
            build_number: None,
            source_revision: None,
            error: None,
        };
        assert!(trigger.notify_of_completion(report, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn completion_without_prior_trigger_is_invariant_violation() {
        let trigger = trigger();
        let id = ApplicationId::new("acme", "web");
        trigger
            .repository
            .insert(Application::new(id.clone(), spec(), Some("proj".into())))
            .await;

        let report = JobReport {
            application_id: id,
            project_id: Some("proj".into()),
            job_type: JobType::SystemTest,
            build_number: None,
            source_revision: None,
            error: None,
        };
        let result = trigger.notify_of_completion(report, Utc::now()).await;
        assert!(matches!(result, Err(TriggerError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn component_success_sets_current_change_when_nothing_else_in_flight() {
        let trigger = trigger();
        let id = ApplicationId::new("acme", "web");
        trigger
            .repository
            .insert(Application::new(id.clone(), spec(), Some("proj".into())))
            .await;

        let report = JobReport {
            application_id: id.clone(),
            project_id: Some("proj".into()),
            job_type: JobType::Component,
            build_number: Some(42),
            source_revision: Some("abc123".into()),
            error: None,
        };
        trigger.notify_of_completion(report, Utc::now()).await.unwrap();

        let app = trigger.repository.require(&id).await.unwrap();
        assert_eq!(app.current_change.application_version, Some(ApplicationVersion::from_build("abc123", 42)));
        assert!(app.outstanding_change.is_none());
    }

    #[tokio::test]
    async fn component_success_during_platform_change_is_outstanding() {
        let trigger = trigger();
        let id = ApplicationId::new("acme", "web");
        let mut app = Application::new(id.clone(), spec(), Some("proj".into()));
        app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
        trigger.repository.insert(app).await;

        let report = JobReport {
            application_id: id.clone(),
            project_id: Some("proj".into()),
            job_type: JobType::Component,
            build_number: Some(1),
            source_revision: Some("rev".into()),
            error: None,
        };
        trigger.notify_of_completion(report, Utc::now()).await.unwrap();

        let app = trigger.repository.require(&id).await.unwrap();
        assert_eq!(app.current_change.platform_version, Some(PlatformVersion::new("7.3")));
        assert!(app.current_change.application_version.is_none());
        assert_eq!(
            app.outstanding_change,
            Some(Change::of_application(ApplicationVersion::from_build("rev", 1)))
        );
    }

    #[tokio::test]
    async fn production_success_records_a_deployment() {
        let trigger = trigger();
        let id = ApplicationId::new("acme", "web");
        let zone = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        let mut app = Application::new(id.clone(), spec(), Some("proj".into()));
        app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
        let run = crate::domain::JobRun {
            platform: PlatformVersion::new("7.3"),
            application: ApplicationVersion::unknown(),
            source_platform: None,
            source_application: None,
            reason: "planned".into(),
            at: Utc::now() - chrono::Duration::minutes(1),
        };
        app.record_trigger(JobType::Production(zone.clone()), run);
        trigger.repository.insert(app).await;

        let now = Utc::now();
        let report = JobReport {
            application_id: id.clone(),
            project_id: Some("proj".into()),
            job_type: JobType::Production(zone.clone()),
            build_number: None,
            source_revision: None,
            error: None,
        };
        trigger.notify_of_completion(report, now).await.unwrap();

        let app = trigger.repository.require(&id).await.unwrap();
        let deployment = app.deployments.get(&zone).expect("deployment recorded");
        assert_eq!(deployment.platform_version, PlatformVersion::new("7.3"));
        assert_eq!(deployment.application_version, ApplicationVersion::unknown());
        assert_eq!(deployment.timestamp, now);
    }

    #[tokio::test]
    async fn outstanding_change_is_promoted_once_the_current_change_completes() {
        let trigger = trigger();
        let id = ApplicationId::new("acme", "web");
        let zone = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        let production_only_spec = DeploymentSpec {
            tests: false,
            steps: vec![StepNode::Zone(zone.clone())],
            block_windows: vec![],
        };
        let mut app = Application::new(id.clone(), production_only_spec, Some("proj".into()));
        app.current_change = Change::of_platform(PlatformVersion::new("7.3"));
        app.outstanding_change = Some(Change::of_application(ApplicationVersion::from_build("rev", 9)));
        let run = crate::domain::JobRun {
            platform: PlatformVersion::new("7.3"),
            application: ApplicationVersion::unknown(),
            source_platform: None,
            source_application: None,
            reason: "planned".into(),
            at: Utc::now() - chrono::Duration::minutes(1),
        };
        app.record_trigger(JobType::Production(zone.clone()), run);
        trigger.repository.insert(app).await;

        let report = JobReport {
            application_id: id.clone(),
            project_id: Some("proj".into()),
            job_type: JobType::Production(zone),
            build_number: None,
            source_revision: None,
            error: None,
        };
        trigger.notify_of_completion(report, Utc::now()).await.unwrap();

        let app = trigger.repository.require(&id).await.unwrap();
        assert_eq!(
            app.current_change,
            Change::of_application(ApplicationVersion::from_build("rev", 9))
        );
        assert!(app.outstanding_change.is_none());
    }
}
