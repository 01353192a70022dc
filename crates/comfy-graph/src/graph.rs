//! Job graphs: the prompt submitted to the execution service
//!
//! A [`JobGraph`] is the wire object `{node_id: node, ...}` kept as a JSON map
//! in document order. Typed access goes through [`NodeSpec`]; structural edits
//! go through the [`editor`](crate::editor) functions, exposed here as methods.

use crate::editor::{self, ClassFilter};
use crate::error::GraphError;
use crate::node::NodeSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Mapping from node id to node specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobGraph(Map<String, Value>);

impl JobGraph {
    /// Create an empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing node map
    #[inline]
    #[must_use]
    pub fn from_map(nodes: Map<String, Value>) -> Self {
        Self(nodes)
    }

    /// Build from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, GraphError> {
        match value {
            Value::Object(nodes) => Ok(Self(nodes)),
            Value::Null => Err(GraphError::NotAnObject("null")),
            Value::Bool(_) => Err(GraphError::NotAnObject("a boolean")),
            Value::Number(_) => Err(GraphError::NotAnObject("a number")),
            Value::String(_) => Err(GraphError::NotAnObject("a string")),
            Value::Array(_) => Err(GraphError::NotAnObject("an array")),
        }
    }

    /// Parse from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, GraphError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Load a graph saved in API format
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GraphError::io_error(path, e))?;
        Self::from_json_str(&text)
    }

    /// Serialize to compact JSON text
    pub fn to_json_string(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Raw node map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutable raw node map
    #[inline]
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Unwrap into the raw node map
    #[inline]
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Number of top-level entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the graph has no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Typed copy of one node
    pub fn node(&self, node_id: &str) -> Result<NodeSpec, GraphError> {
        let value = self
            .0
            .get(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| GraphError::malformed(node_id, e.to_string()))
    }

    /// Insert or replace a node, returning the previous wire value
    pub fn insert_node(&mut self, node_id: impl Into<String>, node: NodeSpec) -> Option<Value> {
        self.0.insert(node_id.into(), node.into_value())
    }

    /// Typed view of every top-level node, in document order
    pub fn nodes(&self) -> Result<Vec<(String, NodeSpec)>, GraphError> {
        self.0
            .keys()
            .map(|id| self.node(id).map(|node| (id.clone(), node)))
            .collect()
    }

    /// Set one input of an existing node
    pub fn set_input(
        &mut self,
        node_id: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        let mut node = self.node(node_id)?;
        node.set_input(key, value);
        self.insert_node(node_id, node);
        Ok(())
    }

    /// Id of the `SaveImage` node, if any
    #[must_use]
    pub fn output_node(&self) -> Option<String> {
        editor::find_output_node(&self.0)
    }

    /// Overwrite `target_key` on every node the filter permits
    ///
    /// See [`editor::replace_key_value`].
    pub fn replace_key_value(
        &mut self,
        target_key: &str,
        new_value: impl Into<Value>,
        filter: &ClassFilter,
    ) {
        editor::replace_key_value(&mut self.0, target_key, &new_value.into(), filter);
    }
}

impl TryFrom<Value> for JobGraph {
    type Error = GraphError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<JobGraph> for Value {
    fn from(graph: JobGraph) -> Self {
        Value::Object(graph.0)
    }
}

impl FromIterator<(String, NodeSpec)> for JobGraph {
    fn from_iter<T: IntoIterator<Item = (String, NodeSpec)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(id, node)| (id, node.into_value()))
                .collect(),
        )
    }
}
