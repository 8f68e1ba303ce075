use async_trait::async_trait;
use std::sync::Mutex;

use super::{BuildJob, BuildServiceError, BuildState};

/// In-memory `BuildService` used by tests (teacher pattern: a mock executor
/// standing in for a remote collaborator). Records every job it was asked to
/// trigger and can be made to fail on demand for specific job names.
#[derive(Default)]
pub struct FakeBuildService {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    triggered: Vec<BuildJob>,
    unknown_jobs: Vec<String>,
    illegal_jobs: Vec<String>,
    transient_failures: Vec<String>,
}

impl FakeBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_unknown(&self, job_name: impl Into<String>) {
        self.inner.lock().unwrap().unknown_jobs.push(job_name.into());
    }

    pub fn fail_illegal(&self, job_name: impl Into<String>) {
        self.inner.lock().unwrap().illegal_jobs.push(job_name.into());
    }

    pub fn fail_transient_once(&self, job_name: impl Into<String>) {
        self.inner.lock().unwrap().transient_failures.push(job_name.into());
    }

    pub fn triggered(&self) -> Vec<BuildJob> {
        self.inner.lock().unwrap().triggered.clone()
    }
}

#[async_trait]
impl super::BuildService for FakeBuildService {
    async fn trigger(&self, job: &BuildJob) -> Result<(), BuildServiceError> {
        let mut state = self.inner.lock().unwrap();

        if let Some(pos) = state.unknown_jobs.iter().position(|n| n == &job.job_name) {
            state.unknown_jobs.remove(pos);
            return Err(BuildServiceError::NotFound(job.job_name.clone()));
        }
        if let Some(pos) = state.illegal_jobs.iter().position(|n| n == &job.job_name) {
            state.illegal_jobs.remove(pos);
            return Err(BuildServiceError::IllegalArgument(job.job_name.clone()));
        }
        if let Some(pos) = state.transient_failures.iter().position(|n| n == &job.job_name) {
            state.transient_failures.remove(pos);
            return Err(BuildServiceError::Transient("simulated outage".into()));
        }

        state.triggered.push(job.clone());
        Ok(())
    }

    async fn state_of(&self, _job: &BuildJob) -> Result<BuildState, BuildServiceError> {
        Ok(BuildState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_service::BuildService;
    use crate::domain::ApplicationId;

    #[tokio::test]
    async fn records_successful_triggers() {
        let svc = FakeBuildService::new();
        let job = BuildJob {
            application_id: ApplicationId::new("acme", "web"),
            project_id: "proj-1".into(),
            job_name: "systemTest".into(),
        };
        svc.trigger(&job).await.unwrap();
        assert_eq!(svc.triggered().len(), 1);
    }

    #[tokio::test]
    async fn simulates_unknown_job_once() {
        let svc = FakeBuildService::new();
        svc.fail_unknown("systemTest");
        let job = BuildJob {
            application_id: ApplicationId::new("acme", "web"),
            project_id: "proj-1".into(),
            job_name: "systemTest".into(),
        };
        assert!(matches!(svc.trigger(&job).await, Err(BuildServiceError::NotFound(_))));
        assert!(svc.trigger(&job).await.is_ok());
    }
}
