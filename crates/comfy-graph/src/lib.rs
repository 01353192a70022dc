//! ComfyUI job graphs
//!
//! Typed access to the "prompt" objects the execution service consumes, plus
//! the structural operations used to prepare them and to interpret results.
//!
//! # Core Concepts
//!
//! - [`JobGraph`]: node id → node mapping, kept in document order
//! - [`NodeSpec`]: one node, a [`ClassType`] plus an open parameter bag
//! - [`find_output_node`]: locate the `SaveImage` node holding job outputs
//! - [`replace_key_value`]: filtered, recursive in-place parameter edits
//!
//! # Example
//!
//! ```rust,ignore
//! use comfy_graph::{ClassFilter, JobGraph};
//!
//! let mut graph = JobGraph::load("workflow_api.json")?;
//! graph.replace_key_value("seed", 42, &ClassFilter::all());
//! let output = graph.output_node().expect("workflow has a SaveImage node");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod editor;
pub mod error;
pub mod graph;
pub mod node;

pub use editor::{find_output_node, replace_key_value, ClassFilter};
pub use error::GraphError;
pub use graph::JobGraph;
pub use node::{ClassType, NodeSpec, CLASS_TYPE_KEY, INPUTS_KEY};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
