//! Change Calculus (§4.D): whether a change is tested, already deployed,
//! dominated by an existing deployment, and what residual change remains.

use super::application::{Application, JobType};
use super::change::Change;
use super::versions::Versions;
use crate::context::PlanningContext;

/// True if the job's last-success targets match the Versions built from
/// `(change, application, deploymentFor(jobType))`, or if the job is a
/// production job whose zone already holds a deployment that `change` does
/// not upgrade while the application's full current change downgrades it
/// (a zone is never downgraded when a broken change is rolled back).
pub fn is_complete(ctx: &PlanningContext, change: &Change, application: &Application, job_type: &JobType) -> bool {
    if !change.is_present() {
        return true;
    }

    let deployment = application.deployment_for(job_type);
    let target = Versions::from(change, application, deployment, &ctx.system_platform_version);

    let matched_by_success = application
        .status_of(job_type)
        .and_then(|s| s.last_success.as_ref())
        .is_some_and(|run| target.targets_match(run) && target.sources_match_if_present(run));
    if matched_by_success {
        return true;
    }

    if job_type.is_production() {
        if let Some(deployment) = deployment {
            if !change.upgrades(deployment) && application.current_change.downgrades(deployment) {
                return true;
            }
        }
    }

    false
}

/// There is a successful systemTest with matching target AND a successful
/// stagingTest with matching target and sources (if present); OR some
/// production job has already been triggered with matching versions
/// ("already-tested by progression").
pub fn is_tested(application: &Application, versions: &Versions) -> bool {
    let system_tested = application
        .status_of(&JobType::SystemTest)
        .and_then(|s| s.last_success.as_ref())
        .is_some_and(|run| versions.targets_match(run));

    let staging_tested = application
        .status_of(&JobType::StagingTest)
        .and_then(|s| s.last_success.as_ref())
        .is_some_and(|run| versions.targets_match(run) && versions.sources_match_if_present(run));

    if system_tested && staging_tested {
        return true;
    }

    application.deployment_jobs.iter().any(|(job_type, status)| {
        job_type.is_production()
            && status
                .last_triggered
                .as_ref()
                .is_some_and(|run| versions.targets_match(run) && versions.sources_match_if_present(run))
    })
}

/// Strips the platform component from the current change if all relevant
/// jobs are complete for `change.withoutApplication`, and strips the
/// application component if all are complete for `change.withoutPlatform`.
/// "Relevant jobs" are the spec's production jobs, or its test jobs if the
/// spec declares no production steps. Returns the possibly-reduced Change;
/// empty means done.
pub fn remaining_change(ctx: &PlanningContext, application: &Application) -> Change {
    let change = application.current_change.clone();
    if !change.is_present() {
        return change;
    }

    let production_jobs = application.deployment_spec.all_production_jobs();
    let jobs: Vec<JobType> = if !production_jobs.is_empty() {
        production_jobs
    } else {
        application.deployment_spec.test_jobs()
    };

    if jobs.is_empty() {
        return change;
    }

    let mut result = change.clone();

    let platform_only = change.without_application();
    if jobs.iter().all(|j| is_complete(ctx, &platform_only, application, j)) {
        result.platform_version = None;
    }

    let application_only = change.without_platform();
    if jobs.iter().all(|j| is_complete(ctx, &application_only, application, j)) {
        result.application_version = None;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::{ApplicationId, Deployment, JobRun, Zone};
    use crate::domain::deployment_steps::DeploymentSpec;
    use crate::domain::job_status::JobStatus;
    use crate::domain::versions::{ApplicationVersion, PlatformVersion};
    use chrono::Utc;

    fn ctx() -> PlanningContext {
        PlanningContext::new(Utc::now(), PlatformVersion::new("1.0"), chrono::Duration::hours(12))
    }

    fn bare_application() -> Application {
        Application::new(
            ApplicationId::new("acme", "web"),
            DeploymentSpec {
                tests: true,
                steps: vec![],
                block_windows: vec![],
            },
            Some("proj-1".into()),
        )
    }

    #[test]
    fn empty_change_is_always_complete() {
        let ctx = ctx();
        let app = bare_application();
        assert!(is_complete(&ctx, &Change::empty(), &app, &JobType::SystemTest));
    }

    #[test]
    fn downgrade_protection_marks_zone_complete_without_upgrade() {
        let ctx = ctx();
        let mut app = bare_application();
        let zone = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        app.deployments.insert(
            zone.clone(),
            Deployment {
                platform_version: PlatformVersion::new("8.0"),
                application_version: ApplicationVersion::from_build("rev", 1),
                timestamp: Utc::now(),
            },
        );
        app.current_change = Change::of_platform(PlatformVersion::new("7.0"));
        let job = JobType::Production(zone);
        assert!(is_complete(&ctx, &app.current_change.clone(), &app, &job));
    }

    #[test]
    fn is_tested_by_progression_when_production_already_triggered() {
        let mut app = bare_application();
        let versions = Versions {
            target_platform: PlatformVersion::new("7.3"),
            target_application: ApplicationVersion::unknown(),
            source_platform: None,
            source_application: None,
        };
        let zone = Zone {
            env: "prod".into(),
            region: "us-east-1".into(),
        };
        app.deployment_jobs.insert(
            JobType::Production(zone.clone()),
            JobStatus {
                last_triggered: Some(JobRun {
                    platform: versions.target_platform.clone(),
                    application: versions.target_application.clone(),
                    source_platform: None,
                    source_application: None,
                    reason: "test".into(),
                    at: Utc::now(),
                }),
                ..Default::default()
            },
        );
        assert!(is_tested(&app, &versions));
    }
}
