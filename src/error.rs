use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::domain::application::ApplicationId;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("change already in progress for application {application}")]
    ChangeConflict { application: ApplicationId },

    #[error("unknown application {application}")]
    UnknownApplication { application: ApplicationId },

    #[error("unknown job type {job_type}")]
    UnknownJob { job_type: String },

    #[error("illegal to trigger job type {job_type}")]
    IllegalJob { job_type: String },

    #[error("transient build service failure: {0}")]
    TransientBuildService(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl TriggerError {
    fn status_code(&self) -> StatusCode {
        match self {
            TriggerError::ChangeConflict { .. } => StatusCode::CONFLICT,
            TriggerError::UnknownApplication { .. } => StatusCode::NOT_FOUND,
            TriggerError::UnknownJob { .. } | TriggerError::IllegalJob { .. } => StatusCode::BAD_GATEWAY,
            TriggerError::TransientBuildService(_) => StatusCode::SERVICE_UNAVAILABLE,
            TriggerError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TriggerError::Config(_) | TriggerError::Io(_) | TriggerError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody { error: self.to_string() };
        (status, axum::Json(body)).into_response()
    }
}
