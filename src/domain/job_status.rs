use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::application::{ErrorKind, JobRun};

/// Per (application, job type) history. Read-only for the planner; mutated
/// only by the reconciler/triggering engine through the application
/// repository under the application lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub last_triggered: Option<JobRun>,
    pub last_completed: Option<DateTime<Utc>>,
    pub last_success: Option<JobRun>,
    /// Most recent failed completion; distinct from `first_failing`, which
    /// marks the start of the current unbroken failure streak.
    pub last_failure: Option<DateTime<Utc>>,
    pub first_failing: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        self.last_completed.is_some() && self.last_error.is_none()
    }

    pub fn is_out_of_capacity(&self) -> bool {
        self.last_error == Some(ErrorKind::OutOfCapacity)
    }

    /// `lastTriggered` after `lastCompleted` and within the timeout horizon.
    pub fn is_running(&self, now: DateTime<Utc>, timeout_horizon: Duration) -> bool {
        match (&self.last_triggered, self.last_completed) {
            (Some(run), Some(completed)) => run.at > completed && now - run.at < timeout_horizon,
            (Some(run), None) => now - run.at < timeout_horizon,
            (None, _) => false,
        }
    }

    /// Records a completion. On success, extends `first_failing`'s streak to
    /// an end and (if a run is supplied) updates `last_success`. On failure,
    /// starts or continues the failure streak and records the error kind.
    pub fn record_completion(&mut self, at: DateTime<Utc>, success_run: Option<JobRun>, error: Option<ErrorKind>) {
        self.last_completed = Some(at);
        match error {
            None => {
                if let Some(run) = success_run {
                    self.last_success = Some(run);
                }
                self.first_failing = None;
                self.last_error = None;
            }
            Some(kind) => {
                self.last_failure = Some(at);
                self.last_error = Some(kind);
                if self.first_failing.is_none() {
                    self.first_failing = Some(at);
                }
            }
        }
    }

    pub fn record_trigger(&mut self, run: JobRun) {
        self.last_triggered = Some(run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::versions::{ApplicationVersion, PlatformVersion};

    fn run(at: DateTime<Utc>) -> JobRun {
        JobRun {
            platform: PlatformVersion::new("1.0"),
            application: ApplicationVersion::unknown(),
            source_platform: None,
            source_application: None,
            reason: "test".into(),
            at,
        }
    }

    #[test]
    fn is_running_only_when_triggered_after_last_completion_and_within_horizon() {
        let base = Utc::now();
        let mut status = JobStatus::default();
        status.last_triggered = Some(run(base));
        status.last_completed = Some(base - Duration::minutes(5));

        assert!(status.is_running(base + Duration::minutes(1), Duration::hours(12)));
        assert!(!status.is_running(base + Duration::hours(13), Duration::hours(12)));
    }

    #[test]
    fn not_running_once_a_later_completion_is_recorded() {
        let base = Utc::now();
        let mut status = JobStatus::default();
        status.last_triggered = Some(run(base));
        status.last_completed = Some(base + Duration::minutes(1));

        assert!(!status.is_running(base + Duration::minutes(2), Duration::hours(12)));
    }

    #[test]
    fn record_completion_tracks_failure_streak_start_and_clears_on_success() {
        let base = Utc::now();
        let mut status = JobStatus::default();

        status.record_completion(base, None, Some(ErrorKind::DeploymentFailure));
        assert_eq!(status.first_failing, Some(base));

        status.record_completion(base + Duration::minutes(1), None, Some(ErrorKind::DeploymentFailure));
        assert_eq!(status.first_failing, Some(base));

        let success = run(base + Duration::minutes(2));
        status.record_completion(base + Duration::minutes(2), Some(success.clone()), None);
        assert!(status.first_failing.is_none());
        assert!(status.is_success());
        assert_eq!(status.last_success.unwrap().at, success.at);
    }
}
