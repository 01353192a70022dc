//! Error types for job graph handling

use std::path::PathBuf;

/// Errors raised while loading or reshaping a job graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Graph file could not be read
    #[error("failed to read job graph from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Graph text is not valid JSON
    #[error("invalid job graph JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Graph root is a JSON value other than an object
    #[error("job graph root must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A top-level node cannot be read as a node specification
    #[error("node '{node_id}' is malformed: {reason}")]
    MalformedNode { node_id: String, reason: String },

    /// Referenced node does not exist
    #[error("node '{0}' not found in job graph")]
    NodeNotFound(String),
}

impl GraphError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create malformed-node error
    pub fn malformed(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedNode {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}
