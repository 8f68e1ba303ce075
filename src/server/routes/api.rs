//! External-Change API routes (§4.I / §4.L): start, cancel, and force-trigger
//! changes, plus a read-only `jobsToRun` snapshot.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::application::{ApplicationId, JobType};
use crate::domain::{ApplicationVersion, Change, PlatformVersion};
use crate::engine::Candidate;
use crate::error::{Result, TriggerError};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct ChangeRequest {
    pub platform_version: Option<String>,
    pub application_source_revision: Option<String>,
    pub application_build_number: Option<u64>,
}

fn application_id(tenant: &str, name: &str) -> ApplicationId {
    ApplicationId::new(tenant, name)
}

pub async fn trigger_change(
    State(state): State<Arc<AppState>>,
    Path((tenant, name)): Path<(String, String)>,
    Json(body): Json<ChangeRequest>,
) -> Result<StatusCode> {
    let id = application_id(&tenant, &name);
    let mut change = Change::empty();
    if let Some(platform) = body.platform_version {
        change = change.with_platform(PlatformVersion::new(platform));
    }
    if let (Some(revision), Some(build_number)) = (body.application_source_revision, body.application_build_number) {
        change = change.with_application(ApplicationVersion::from_build(revision, build_number));
    }

    state.trigger.trigger_change(&id, change).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub keep_application: bool,
}

pub async fn cancel_change(
    State(state): State<Arc<AppState>>,
    Path((tenant, name)): Path<(String, String)>,
    Query(query): Query<CancelQuery>,
) -> Result<StatusCode> {
    let id = application_id(&tenant, &name);
    state.trigger.cancel_change(&id, query.keep_application).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn force_trigger(
    State(state): State<Arc<AppState>>,
    Path((tenant, name, job_type)): Path<(String, String, String)>,
) -> Result<Json<Vec<String>>> {
    let id = application_id(&tenant, &name);
    let job_type = JobType::from_str(&job_type).map_err(|_| TriggerError::UnknownJob { job_type })?;

    let dispatched = state.trigger.force_trigger(&id, job_type, "api", chrono::Utc::now()).await?;
    Ok(Json(dispatched.into_iter().map(|j| j.canonical_name()).collect()))
}

pub async fn jobs_to_run(
    State(state): State<Arc<AppState>>,
    Path((tenant, name)): Path<(String, String)>,
) -> Result<Json<HashMap<String, Vec<Candidate>>>> {
    let id = application_id(&tenant, &name);
    let jobs = state.trigger.jobs_to_run(&id, chrono::Utc::now()).await?;
    Ok(Json(jobs))
}
