//! Retry Policy (§4.E): given a job status and the current instant, decides
//! whether the job may be re-triggered.

use chrono::Duration;

use super::application::JobType;
use super::job_status::JobStatus;
use crate::context::PlanningContext;

const TIGHT_RETRY_WINDOW: i64 = 60; // seconds
const OUT_OF_CAPACITY_COOLDOWN: i64 = 60; // seconds
const RECENT_FAILURE_WINDOW: i64 = 3600; // seconds, firstFailing within the last hour
const RECENT_FAILURE_COOLDOWN: i64 = 600; // seconds, lastCompleted at least 10 minutes ago
const STALE_FAILURE_COOLDOWN: i64 = 7200; // seconds, lastCompleted at least 2 hours ago

/// True if `status` may be triggered again at `ctx.now`.
pub fn may_trigger(ctx: &PlanningContext, job_type: &JobType, status: Option<&JobStatus>) -> bool {
    let Some(status) = status else {
        return true;
    };

    if let (Some(success), Some(failure)) = (&status.last_success, status.last_failure) {
        if success.at > failure {
            return true;
        }
    } else if status.last_success.is_some() && status.last_failure.is_none() {
        return true;
    }

    let Some(first_failing) = status.first_failing else {
        // No failure on record at all: nothing is blocking a retry.
        return true;
    };

    let Some(last_completed) = status.last_completed else {
        return true;
    };

    // Out-of-capacity test failures have their own cooldown and never take
    // the generic tight-retry-window fast path, even within the first minute.
    if job_type.is_test() && status.is_out_of_capacity() {
        return ctx.now - last_completed >= Duration::seconds(OUT_OF_CAPACITY_COOLDOWN);
    }

    if ctx.now - first_failing < Duration::seconds(TIGHT_RETRY_WINDOW) {
        return true;
    }

    if ctx.now - first_failing < Duration::seconds(RECENT_FAILURE_WINDOW) {
        return ctx.now - last_completed >= Duration::seconds(RECENT_FAILURE_COOLDOWN);
    }

    ctx.now - last_completed >= Duration::seconds(STALE_FAILURE_COOLDOWN)
}
