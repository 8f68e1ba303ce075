use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BuildJob, BuildServiceError, BuildState};

/// HTTP-backed `BuildService`, modeled on the teacher's `reqwest` usage for
/// talking to a remote peer: a bare client, a base URL, a bearer token and a
/// fixed timeout per call.
pub struct HttpBuildService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBuildService {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");

        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }
}

#[async_trait]
impl super::BuildService for HttpBuildService {
    async fn trigger(&self, job: &BuildJob) -> Result<(), BuildServiceError> {
        let url = format!("{}/projects/{}/jobs/{}/trigger", self.base_url, job.project_id, job.job_name);

        debug!(url = %url, application = %job.application_id, "Triggering build-service job");

        let resp = self
            .request(self.client.post(&url))
            .json(job)
            .send()
            .await
            .map_err(|e| BuildServiceError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::CREATED => Ok(()),
            StatusCode::NOT_FOUND => Err(BuildServiceError::NotFound(job.job_name.clone())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(BuildServiceError::IllegalArgument(job.job_name.clone()))
            }
            status => {
                warn!(status = %status, job = %job.job_name, "Unexpected build-service response");
                Err(BuildServiceError::Transient(format!("unexpected status {status}")))
            }
        }
    }

    async fn state_of(&self, job: &BuildJob) -> Result<BuildState, BuildServiceError> {
        let url = format!("{}/projects/{}/jobs/{}/state", self.base_url, job.project_id, job.job_name);

        let resp = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| BuildServiceError::Transient(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BuildServiceError::NotFound(job.job_name.clone()));
        }
        if !resp.status().is_success() {
            return Err(BuildServiceError::Transient(format!("unexpected status {}", resp.status())));
        }

        resp.json::<BuildState>()
            .await
            .map_err(|e| BuildServiceError::Transient(e.to_string()))
    }
}
