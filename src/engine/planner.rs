//! Ready-Jobs Planner (§4.F): for one application, produces the list of jobs
//! currently eligible to run, given its current change, its pipeline, and
//! completion state. CPU-only; takes no locks beyond the snapshot it is
//! handed.

use chrono::{DateTime, Utc};

use crate::context::PlanningContext;
use crate::domain::{
    is_complete, is_tested, may_trigger, Application, ApplicationId, Change, ChangeKind, JobType, Versions,
};

/// One job the planner judges eligible to run right now.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Candidate {
    pub application_id: ApplicationId,
    pub job_type: JobType,
    pub versions: Versions,
    pub reason: String,
    pub available_since: DateTime<Utc>,
    pub is_retry: bool,
    pub is_out_of_capacity_retry: bool,
    pub is_application_upgrade: bool,
}

/// Produces every candidate job for `application` at `ctx.now`.
pub fn ready_jobs(ctx: &PlanningContext, application: &Application) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut tests_frozen = false;

    let mut completed_at = test_completed_at(application);

    let change = application.current_change.clone();
    if change.is_present() {
        for step in application.deployment_spec.production() {
            match step {
                crate::domain::ProductionStep::Delay(duration) => {
                    completed_at = completed_at.and_then(|at| {
                        let advanced = at + duration;
                        (advanced <= ctx.now).then_some(advanced)
                    });
                }
                crate::domain::ProductionStep::Jobs(jobs, _) => {
                    let (complete, remaining): (Vec<_>, Vec<_>) =
                        jobs.into_iter().partition(|j| is_complete(ctx, &change, application, j));

                    if remaining.is_empty() {
                        completed_at = complete
                            .iter()
                            .filter_map(|j| application.status_of(j).and_then(|s| s.last_completed))
                            .max();
                        continue;
                    }

                    for job_type in &remaining {
                        let deployment = application.deployment_for(job_type);
                        let versions = Versions::from(&change, application, deployment, &ctx.system_platform_version);

                        if is_tested(application, &versions) {
                            tests_frozen = true;
                            if let Some(since) = completed_at {
                                emit_production_candidate(
                                    ctx,
                                    application,
                                    &change,
                                    job_type.clone(),
                                    versions,
                                    since,
                                    &mut candidates,
                                );
                            }
                        } else if !tests_frozen {
                            tests_frozen = true;
                            let since = completed_at.unwrap_or(ctx.now);
                            emit_test_candidates(ctx, application, &versions, since, &mut candidates);
                        }
                    }

                    completed_at = None;
                }
            }
        }
    }

    if !tests_frozen {
        let baseline = Versions::from(&Change::empty(), application, None, &ctx.system_platform_version);
        let since = completed_at.unwrap_or(ctx.now);
        emit_test_candidates(ctx, application, &baseline, since, &mut candidates);
    }

    candidates
}

fn test_completed_at(application: &Application) -> Option<DateTime<Utc>> {
    let system = application.status_of(&JobType::SystemTest).and_then(|s| s.last_success.as_ref());
    let staging = application.status_of(&JobType::StagingTest).and_then(|s| s.last_success.as_ref());
    match (system, staging) {
        (Some(a), Some(b)) => Some(a.at.max(b.at)),
        _ => None,
    }
}

fn change_kind(change: &Change) -> ChangeKind {
    match (change.platform_version.is_some(), change.application_version.is_some()) {
        (true, true) => ChangeKind::Both,
        (true, false) => ChangeKind::Platform,
        (false, true) => ChangeKind::Application,
        (false, false) => ChangeKind::Both,
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_production_candidate(
    ctx: &PlanningContext,
    application: &Application,
    change: &Change,
    job_type: JobType,
    versions: Versions,
    available_since: DateTime<Utc>,
    out: &mut Vec<Candidate>,
) {
    if application.is_running(&job_type, ctx.now, ctx.job_timeout) {
        return;
    }
    if application.deployment_spec.blocked_by(ctx.now, change_kind(change)) {
        return;
    }
    let status = application.status_of(&job_type);
    if !may_trigger(ctx, &job_type, status) {
        return;
    }

    let is_retry = status.is_some_and(|s| s.last_error.is_some());
    let is_out_of_capacity_retry = status.is_some_and(|s| s.is_out_of_capacity());
    let is_application_upgrade = is_application_upgrade(application, &job_type, &versions);

    out.push(Candidate {
        application_id: application.id.clone(),
        job_type: job_type.clone(),
        reason: format!("production step {job_type} for change {change:?}"),
        versions,
        available_since,
        is_retry,
        is_out_of_capacity_retry,
        is_application_upgrade,
    });
}

fn emit_test_candidates(
    ctx: &PlanningContext,
    application: &Application,
    versions: &Versions,
    available_since: DateTime<Utc>,
    out: &mut Vec<Candidate>,
) {
    for job_type in missing_tests(application, versions) {
        if application.is_running(&job_type, ctx.now, ctx.job_timeout) {
            continue;
        }
        let status = application.status_of(&job_type);
        if !may_trigger(ctx, &job_type, status) {
            continue;
        }

        let is_retry = status.is_some_and(|s| s.last_error.is_some());
        let is_out_of_capacity_retry = status.is_some_and(|s| s.is_out_of_capacity());
        let is_application_upgrade = is_application_upgrade(application, &job_type, versions);

        out.push(Candidate {
            application_id: application.id.clone(),
            job_type: job_type.clone(),
            reason: format!("{job_type} for target {}", versions.target_application),
            versions: versions.clone(),
            available_since,
            is_retry,
            is_out_of_capacity_retry,
            is_application_upgrade,
        });
    }
}

/// Which of systemTest/stagingTest have not yet succeeded against `versions`.
/// The two are a fixed ordered sequence: stagingTest is never missing (and
/// never candidate for triggering) until systemTest has succeeded.
pub(crate) fn missing_tests(application: &Application, versions: &Versions) -> Vec<JobType> {
    let mut missing = Vec::new();

    let system_ok = application
        .status_of(&JobType::SystemTest)
        .and_then(|s| s.last_success.as_ref())
        .is_some_and(|run| versions.targets_match(run));
    if !system_ok {
        missing.push(JobType::SystemTest);
        return missing;
    }

    let staging_ok = application
        .status_of(&JobType::StagingTest)
        .and_then(|s| s.last_success.as_ref())
        .is_some_and(|run| versions.targets_match(run) && versions.sources_match_if_present(run));
    if !staging_ok {
        missing.push(JobType::StagingTest);
    }

    missing
}

fn is_application_upgrade(application: &Application, job_type: &JobType, versions: &Versions) -> bool {
    let baseline = match application.deployment_for(job_type) {
        Some(deployment) => deployment.application_version.clone(),
        None => application.baseline_application_version(),
    };
    versions.target_application > baseline
}
