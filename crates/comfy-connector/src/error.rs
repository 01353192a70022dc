//! Error types for the connector
//!
//! Distinguishes the failure classes a caller has to act on differently:
//! - Service unreachable vs. misbehaving (transport)
//! - Missing history/artifacts
//! - Job graphs that cannot be retrieved from (no output node)
//! - Jobs that never finish (timeout, cancellation)

use crate::types::JobId;
use comfy_graph::GraphError;
use std::path::PathBuf;
use std::time::Duration;

/// Main connector error type
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Service did not answer, or answered something other than 200 on `/`
    #[error("service at {address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// Error or malformed response on a service endpoint
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// History entry or artifact is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Submitted graph cannot be retrieved from
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// No completion signal within the allowed time
    #[error("job {job_id} did not complete within {waited:?}")]
    Timeout { job_id: JobId, waited: Duration },

    /// Wait abandoned through the cancellation token
    #[error("wait for job {job_id} was cancelled")]
    Cancelled { job_id: JobId },

    /// Event stream could not be opened, or dropped mid-wait
    #[error("event stream error: {0}")]
    EventStream(String),

    /// Artifact bytes are not a decodable image
    #[error("failed to decode artifact {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: image::ImageError,
    },

    /// Job graph could not be loaded or read
    #[error("job graph error: {0}")]
    Graph(#[from] GraphError),

    /// Local file access failed
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration value missing or invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Check if a later attempt may succeed without caller changes
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable { .. } | Self::EventStream(_) | Self::Timeout { .. } => true,
            Self::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Check if the error reports a missing resource
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Create unreachable error
    pub fn unreachable(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures talking to one service endpoint
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Request never produced a response
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response carried a non-success status
    #[error("{endpoint} responded with HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Response body is not the expected JSON
    #[error("malformed response from {endpoint}: {source}")]
    MalformedBody {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl TransportError {
    /// Server-side and connection failures are worth retrying
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::MalformedBody { .. } | Self::ClientBuild(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_error_display() {
        let err = ConnectorError::unreachable("http://localhost:7777", "connection refused");
        assert_eq!(
            err.to_string(),
            "service at http://localhost:7777 is unreachable: connection refused"
        );

        let err = ConnectorError::Timeout {
            job_id: JobId::from("abc"),
            waited: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "job abc did not complete within 3s");
    }

    #[test]
    fn connector_error_is_retryable() {
        assert!(ConnectorError::unreachable("x", "down").is_retryable());
        assert!(ConnectorError::EventStream("closed".into()).is_retryable());
        assert!(!ConnectorError::PreconditionFailed("no SaveImage".into()).is_retryable());
        assert!(!ConnectorError::Cancelled { job_id: JobId::from("a") }.is_retryable());
    }

    #[test]
    fn transport_status_retry_depends_on_code() {
        let server = TransportError::Status {
            endpoint: "/prompt".into(),
            status: 503,
            body: String::new(),
        };
        let client = TransportError::Status {
            endpoint: "/prompt".into(),
            status: 400,
            body: "invalid prompt".into(),
        };
        assert!(ConnectorError::from(server).is_retryable());
        assert!(!ConnectorError::from(client).is_retryable());
    }

    #[test]
    fn not_found_predicate() {
        assert!(ConnectorError::NotFound("history for job x".into()).is_not_found());
        assert!(!ConnectorError::Config("bad".into()).is_not_found());
    }
}
