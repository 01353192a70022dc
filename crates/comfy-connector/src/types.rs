//! Core types for the connector
//!
//! Defines the values exchanged with the execution service:
//! - Job and client identifiers
//! - Artifact references and history records
//! - Upload requests and acknowledgements
//! - Decoded job outputs

use crate::error::{ConnectorError, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use uuid::Uuid;

/// Job identifier assigned by the service at submission
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a service-issued id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as sent on the wire
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity scoping one connector's event stream
///
/// Fixed for the lifetime of the connector so that the service routes this
/// client's events to it alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate `"{app_name}-{uuid}"`
    #[must_use]
    pub fn generate(app_name: &str) -> Self {
        Self(format!("{app_name}-{}", Uuid::new_v4()))
    }

    /// Use a caller-chosen identity
    #[inline]
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id as sent on the wire
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a binary artifact stored by the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name within the folder
    pub filename: String,
    /// Sub-folder, empty for the folder root
    #[serde(default)]
    pub subfolder: String,
    /// Folder type: `output`, `input` or `temp`
    #[serde(rename = "type")]
    pub folder_type: String,
}

impl ArtifactRef {
    /// Create a reference
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        subfolder: impl Into<String>,
        folder_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            subfolder: subfolder.into(),
            folder_type: folder_type.into(),
        }
    }

    /// Reference into the `output` folder
    #[inline]
    #[must_use]
    pub fn output(filename: impl Into<String>) -> Self {
        Self::new(filename, "", "output")
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.subfolder.is_empty() {
            write!(f, "{}/{}", self.folder_type, self.filename)
        } else {
            write!(f, "{}/{}/{}", self.folder_type, self.subfolder, self.filename)
        }
    }
}

/// Results one node produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Images written by the node
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
    /// Other result kinds (text, gifs, latents), kept raw
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// History entry for one finished job
///
/// Node outputs are heterogeneous and kept raw; only the node a caller asks
/// for is parsed, so an odd result on an unrelated node cannot spoil retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Node id → raw node results
    #[serde(default)]
    pub outputs: Map<String, Value>,
    /// Echoed prompt, status and other bookkeeping, kept raw
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryRecord {
    /// With images appended to one node's outputs
    #[must_use]
    pub fn with_images(
        mut self,
        node_id: impl Into<String>,
        images: impl IntoIterator<Item = ArtifactRef>,
    ) -> Self {
        let output = self
            .outputs
            .entry(node_id.into())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(output) = output {
            let list = output
                .entry("images")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = list {
                list.extend(images.into_iter().map(|artifact| {
                    json!({
                        "filename": artifact.filename,
                        "subfolder": artifact.subfolder,
                        "type": artifact.folder_type,
                    })
                }));
            }
        }
        self
    }

    /// Parsed results of one node
    ///
    /// `NotFound` when the node reported nothing, `MalformedBody` when its
    /// entry does not have the expected shape.
    pub fn node_output(&self, node_id: &str) -> Result<NodeOutput, ConnectorError> {
        let raw = self.outputs.get(node_id).ok_or_else(|| {
            ConnectorError::NotFound(format!("no outputs recorded for node {node_id}"))
        })?;
        NodeOutput::deserialize(raw).map_err(|source| {
            TransportError::MalformedBody {
                endpoint: format!("/history outputs[{node_id}]"),
                source,
            }
            .into()
        })
    }

    /// Images recorded for one output node, in service order
    pub fn images_for(&self, node_id: &str) -> Result<Vec<ArtifactRef>, ConnectorError> {
        self.node_output(node_id).map(|output| output.images)
    }
}

/// Local file to upload for use by `LoadImage`-style nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// File to send
    pub path: PathBuf,
    /// Target sub-folder on the service
    pub subfolder: Option<String>,
    /// Target folder type on the service
    pub folder_type: Option<String>,
    /// Replace an existing file of the same name
    pub overwrite: bool,
}

impl UploadRequest {
    /// Upload `path` with service defaults
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subfolder: None,
            folder_type: None,
            overwrite: false,
        }
    }

    /// With sub-folder
    #[inline]
    #[must_use]
    pub fn with_subfolder(mut self, subfolder: impl Into<String>) -> Self {
        self.subfolder = Some(subfolder.into());
        self
    }

    /// With folder type
    #[inline]
    #[must_use]
    pub fn with_folder_type(mut self, folder_type: impl Into<String>) -> Self {
        self.folder_type = Some(folder_type.into());
        self
    }

    /// With overwrite flag
    #[inline]
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Service acknowledgement of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    /// Name the file was stored under
    pub name: String,
    /// Sub-folder it landed in
    #[serde(default)]
    pub subfolder: String,
    /// Folder type it landed in
    #[serde(rename = "type", default)]
    pub folder_type: String,
}

/// One decoded job output
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Where the service stored it
    pub artifact: ArtifactRef,
    /// Decoded pixels
    pub image: image::DynamicImage,
}

impl GeneratedImage {
    /// File name on the service
    #[inline]
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.artifact.filename
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn client_id_carries_app_prefix_and_is_unique() {
        let a = ClientId::generate("COMFY_SERVERLESS");
        let b = ClientId::generate("COMFY_SERVERLESS");
        assert!(a.as_str().starts_with("COMFY_SERVERLESS-"));
        assert_eq!(a.as_str().len(), "COMFY_SERVERLESS-".len() + 36);
        assert_ne!(a, b);
    }

    #[test]
    fn history_record_parses_service_shape() {
        let record: HistoryRecord = serde_json::from_value(json!({
            "prompt": [0, "job", {}],
            "outputs": {
                "9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]},
                "12": {"text": ["hello"]}
            },
            "status": {"completed": true}
        }))
        .unwrap();

        assert_eq!(record.images_for("9").unwrap(), vec![ArtifactRef::output("out.png")]);
        assert!(record.images_for("12").unwrap().is_empty());
        assert!(record.extra.contains_key("status"));
        assert!(record.images_for("3").unwrap_err().is_not_found());
    }

    #[test]
    fn malformed_sibling_output_does_not_block_retrieval() {
        let record: HistoryRecord = serde_json::from_value(json!({
            "outputs": {
                "9": {"images": [{"filename": "out.png", "subfolder": "", "type": "output"}]},
                "12": {"images": ["not-an-artifact"]},
                "14": "unexpected"
            }
        }))
        .unwrap();

        assert_eq!(record.images_for("9").unwrap(), vec![ArtifactRef::output("out.png")]);

        let err = record.images_for("12").unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Transport(TransportError::MalformedBody { ref endpoint, .. })
                if endpoint.contains("12")
        ));
        assert!(record.node_output("14").is_err());
    }

    #[test]
    fn with_images_appends_in_order() {
        let record = HistoryRecord::default()
            .with_images("9", [ArtifactRef::output("a.png")])
            .with_images("9", [ArtifactRef::new("b.png", "sub", "temp")]);
        assert_eq!(
            record.images_for("9").unwrap(),
            vec![ArtifactRef::output("a.png"), ArtifactRef::new("b.png", "sub", "temp")]
        );
    }

    #[test]
    fn artifact_ref_uses_type_on_the_wire() {
        let artifact = ArtifactRef::new("a.png", "batch", "temp");
        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({"filename": "a.png", "subfolder": "batch", "type": "temp"})
        );
        assert_eq!(artifact.to_string(), "temp/batch/a.png");
        assert_eq!(ArtifactRef::output("b.png").to_string(), "output/b.png");
    }

    #[test]
    fn upload_ack_tolerates_missing_subfolder() {
        let ack: UploadAck =
            serde_json::from_value(json!({"name": "cat.png", "type": "input"})).unwrap();
        assert_eq!(ack.name, "cat.png");
        assert_eq!(ack.subfolder, "");
        assert_eq!(ack.folder_type, "input");
    }

    #[test]
    fn upload_request_builder() {
        let request = UploadRequest::new("/tmp/cat.png")
            .with_subfolder("pets")
            .with_folder_type("input")
            .overwrite(true);
        assert_eq!(request.subfolder.as_deref(), Some("pets"));
        assert_eq!(request.folder_type.as_deref(), Some("input"));
        assert!(request.overwrite);
    }
}
