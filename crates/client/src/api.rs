//! REST client for the generation backend.
//!
//! [`JobApi`] is the request/response seam the tracker depends on;
//! [`HttpJobApi`] implements it over [`reqwest`] and also exposes the
//! job listing and deletion endpoints.

use async_trait::async_trait;

use quill_core::job::Phase;
use quill_core::request::GenerateRequest;
use quill_core::types::JobId;
use quill_core::update::StatusReport;

use crate::error::TransportError;
use crate::messages::{DeleteJobResponse, GenerateResponse, JobStatusResponse};

/// Request/response calls the tracker needs from the backend.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Queue a new generation job.
    async fn create_job(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError>;

    /// Fetch the current status of a job. Idempotent and safe to retry.
    async fn poll_status(&self, job_id: &JobId) -> Result<StatusReport, TransportError>;
}

/// HTTP client for one generation backend.
pub struct HttpJobApi {
    client: reqwest::Client,
    api_url: String,
}

impl HttpJobApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000/api`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Fetch the full status record of a job.
    pub async fn get_status(&self, job_id: &JobId) -> Result<JobStatusResponse, TransportError> {
        let response = self
            .client
            .get(format!("{}/generate/status/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// List known jobs, newest first, optionally filtered by phase.
    pub async fn list_jobs(
        &self,
        limit: u32,
        phase: Option<Phase>,
    ) -> Result<Vec<JobStatusResponse>, TransportError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(phase) = phase {
            query.push(("status", phase.as_str().to_string()));
        }

        let response = self
            .client
            .get(format!("{}/generate/jobs", self.api_url))
            .query(&query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a job from the backend's tracking table.
    pub async fn delete_job(&self, job_id: &JobId) -> Result<DeleteJobResponse, TransportError> {
        let response = self
            .client
            .delete(format!("{}/generate/jobs/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`TransportError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn create_job(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        let response = self
            .client
            .post(format!("{}/generate/", self.api_url))
            .json(request)
            .send()
            .await?;

        let created: GenerateResponse = Self::parse_response(response).await?;
        tracing::info!(
            job_id = %created.job_id,
            topic = %request.topic,
            "Generation job created",
        );
        Ok(created)
    }

    async fn poll_status(&self, job_id: &JobId) -> Result<StatusReport, TransportError> {
        self.get_status(job_id).await?.into_report()
    }
}
