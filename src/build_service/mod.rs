//! The build service (§6): consumed, never owned. This crate only holds the
//! narrow interface the trigger needs plus two implementations — an HTTP
//! client for production and an in-memory fake for tests.

mod fake;
mod http;

pub use fake::FakeBuildService;
pub use http::HttpBuildService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ApplicationId;

/// `{applicationId, projectId, jobName}` where `jobName` is the canonical
/// string form of a job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub application_id: ApplicationId,
    pub project_id: String,
    pub job_name: String,
}

/// Polled state of a build-service job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Idle,
    Queued,
    Running,
}

/// Failure modes `trigger` may raise, mapped to `TriggerError` variants by
/// the triggering engine (§7).
#[derive(Debug, thiserror::Error)]
pub enum BuildServiceError {
    #[error("unknown job: {0}")]
    NotFound(String),
    #[error("illegal to trigger: {0}")]
    IllegalArgument(String),
    #[error("transient build service error: {0}")]
    Transient(String),
}

#[async_trait]
pub trait BuildService: Send + Sync {
    async fn trigger(&self, job: &BuildJob) -> Result<(), BuildServiceError>;
    async fn state_of(&self, job: &BuildJob) -> Result<BuildState, BuildServiceError>;
}
