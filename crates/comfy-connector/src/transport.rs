//! Request/response calls against the service's HTTP endpoints
//!
//! [`Transport`] is the seam the job client talks through; [`HttpTransport`]
//! is the reqwest implementation. Every method surfaces a typed error, nothing
//! is swallowed at this level.

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, TransportError};
use crate::types::{ArtifactRef, ClientId, HistoryRecord, JobId, UploadAck, UploadRequest};
use async_trait::async_trait;
use comfy_graph::JobGraph;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

/// Endpoint operations of the execution service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET /`; true only for status 200
    async fn check_alive(&self) -> Result<bool, ConnectorError>;

    /// `POST /prompt`; queue a graph and return its job id
    async fn submit(&self, graph: &JobGraph, client_id: &ClientId)
        -> Result<JobId, ConnectorError>;

    /// `GET /history/{id}`; record of a finished job
    async fn fetch_history(&self, job_id: &JobId) -> Result<HistoryRecord, ConnectorError>;

    /// `GET /view`; raw artifact bytes
    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ConnectorError>;

    /// `POST /upload/image`; store a local file on the service
    async fn upload_artifact(&self, request: &UploadRequest) -> Result<UploadAck, ConnectorError>;
}

/// Body of `POST /prompt`
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a JobGraph,
    client_id: &'a ClientId,
}

/// Answer to `POST /prompt`
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    prompt_id: JobId,
}

/// Transport over HTTP using reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for `base_url` (scheme included)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a transport from connector configuration
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        Self::new(config.http_base_url(), config.request_timeout)
    }

    /// Base URL requests are sent to
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ConnectorError> {
        trace!(endpoint, "sending request");
        request.send().await.map_err(|source| {
            TransportError::Request {
                endpoint: endpoint.to_string(),
                source,
            }
            .into()
        })
    }
}

/// Turn a non-success response into a status error, keeping its body text
async fn ensure_success(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

async fn read_bytes(endpoint: &str, response: reqwest::Response) -> Result<Vec<u8>, ConnectorError> {
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|source| {
            TransportError::Request {
                endpoint: endpoint.to_string(),
                source,
            }
            .into()
        })
}

fn parse_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    bytes: &[u8],
) -> Result<T, ConnectorError> {
    serde_json::from_slice(bytes).map_err(|source| {
        TransportError::MalformedBody {
            endpoint: endpoint.to_string(),
            source,
        }
        .into()
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn check_alive(&self) -> Result<bool, ConnectorError> {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .map_err(|e| ConnectorError::unreachable(&self.base_url, e))?;

        let alive = response.status() == StatusCode::OK;
        debug!(status = %response.status(), alive, "reachability check");
        Ok(alive)
    }

    async fn submit(
        &self,
        graph: &JobGraph,
        client_id: &ClientId,
    ) -> Result<JobId, ConnectorError> {
        const ENDPOINT: &str = "/prompt";

        let body = SubmitRequest {
            prompt: graph,
            client_id,
        };
        let request = self.client.post(self.url(ENDPOINT)).json(&body);
        let response = ensure_success(ENDPOINT, self.send(ENDPOINT, request).await?).await?;
        let bytes = read_bytes(ENDPOINT, response).await?;
        let SubmitResponse { prompt_id } = parse_json(ENDPOINT, &bytes)?;

        debug!(job_id = %prompt_id, nodes = graph.len(), "job queued");
        Ok(prompt_id)
    }

    async fn fetch_history(&self, job_id: &JobId) -> Result<HistoryRecord, ConnectorError> {
        let endpoint = format!("/history/{job_id}");

        let request = self.client.get(self.url(&endpoint));
        let response = self.send(&endpoint, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(format!("history for job {job_id}")));
        }
        let response = ensure_success(&endpoint, response).await?;
        let bytes = read_bytes(&endpoint, response).await?;

        // Keyed by job id; an empty object means the job is unknown or unfinished
        let mut entries: serde_json::Map<String, Value> = parse_json(&endpoint, &bytes)?;
        let record = entries
            .remove(job_id.as_str())
            .ok_or_else(|| ConnectorError::NotFound(format!("history for job {job_id}")))?;

        serde_json::from_value(record).map_err(|source| {
            TransportError::MalformedBody { endpoint, source }.into()
        })
    }

    async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ConnectorError> {
        const ENDPOINT: &str = "/view";

        let request = self.client.get(self.url(ENDPOINT)).query(&[
            ("filename", artifact.filename.as_str()),
            ("subfolder", artifact.subfolder.as_str()),
            ("type", artifact.folder_type.as_str()),
        ]);
        let response = self.send(ENDPOINT, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(format!("artifact {artifact}")));
        }
        let response = ensure_success(ENDPOINT, response).await?;
        let bytes = read_bytes(ENDPOINT, response).await?;

        debug!(%artifact, size = bytes.len(), "artifact fetched");
        Ok(bytes)
    }

    async fn upload_artifact(&self, request: &UploadRequest) -> Result<UploadAck, ConnectorError> {
        const ENDPOINT: &str = "/upload/image";

        let contents = tokio::fs::read(&request.path)
            .await
            .map_err(|e| ConnectorError::io_error(&request.path, e))?;
        let file_name = request
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ConnectorError::PreconditionFailed(format!(
                    "upload path {} has no file name",
                    request.path.display()
                ))
            })?;

        let mut form = Form::new()
            .part("image", Part::bytes(contents).file_name(file_name))
            .text("overwrite", request.overwrite.to_string());
        if let Some(subfolder) = &request.subfolder {
            form = form.text("subfolder", subfolder.clone());
        }
        if let Some(folder_type) = &request.folder_type {
            form = form.text("type", folder_type.clone());
        }

        let builder = self.client.post(self.url(ENDPOINT)).multipart(form);
        let response = ensure_success(ENDPOINT, self.send(ENDPOINT, builder).await?).await?;
        let bytes = read_bytes(ENDPOINT, response).await?;
        let ack: UploadAck = parse_json(ENDPOINT, &bytes)?;

        debug!(name = %ack.name, folder = %ack.folder_type, "upload acknowledged");
        Ok(ack)
    }
}
