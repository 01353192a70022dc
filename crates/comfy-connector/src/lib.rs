//! Comfy Connector - client for a ComfyUI-style execution service
//!
//! Turns a job graph into decoded images:
//! - Submits graphs over HTTP, scoped to one client identity
//! - Waits on the websocket event stream for the job's completion signal
//! - Resolves the `SaveImage` node and fetches its artifacts from history
//! - Uploads local images for `LoadImage`-style nodes
//! - Probes functional readiness by round-tripping a reference job
//!
//! # Example
//!
//! ```rust,ignore
//! use comfy_connector::{Connector, ConnectorConfig};
//! use comfy_graph::{ClassFilter, JobGraph};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut connector = Connector::new(ConnectorConfig::from_env()?)?;
//! connector.wait_until_ready().await?;
//!
//! let mut graph = JobGraph::load("workflow.json")?;
//! graph.replace_key_value("seed", 42, &ClassFilter::all());
//!
//! for output in connector.generate_images(&graph).await? {
//!     println!("{} {}x{}", output.filename(), output.image.width(), output.image.height());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod logging;
pub mod readiness;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{JobClient, JobStep};
pub use config::ConnectorConfig;
pub use connector::Connector;
pub use error::{ConnectorError, TransportError};
pub use events::{EventStream, ExecutionEvent, Frame, WebSocketEvents};
pub use readiness::ReadinessProbe;
pub use transport::{HttpTransport, Transport};
pub use types::{
    ArtifactRef, ClientId, GeneratedImage, HistoryRecord, JobId, NodeOutput, UploadAck,
    UploadRequest,
};

pub use comfy_graph::{ClassFilter, JobGraph};
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the connector
    pub use crate::{
        ClassFilter, Connector, ConnectorConfig, ConnectorError, GeneratedImage, JobClient,
        JobGraph, ReadinessProbe, Transport, UploadRequest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
