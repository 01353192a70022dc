//! Typed view of a single job graph node
//!
//! A node on the wire is a JSON object carrying a `class_type` string plus an
//! open set of parameters (usually an `inputs` object). [`NodeSpec`] keeps the
//! parameters as raw JSON so that unknown node classes round-trip untouched,
//! while [`ClassType`] gives the well-known classes a closed spelling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Field naming a node's behaviour
pub const CLASS_TYPE_KEY: &str = "class_type";

/// Field holding a node's input parameters
pub const INPUTS_KEY: &str = "inputs";

/// Node class identifier
///
/// Well-known classes get their own variant; anything else is kept verbatim
/// in [`ClassType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClassType {
    /// Writes generated images to the output folder
    SaveImage,
    /// Emits images to the temp folder for previews
    PreviewImage,
    /// Reads an uploaded image from the input folder
    LoadImage,
    /// Loads a checkpoint (model, clip, vae)
    CheckpointLoaderSimple,
    /// Encodes a text prompt
    CLIPTextEncode,
    /// Allocates an empty latent batch
    EmptyLatentImage,
    /// Runs the sampler
    KSampler,
    /// Decodes latents into pixels
    VAEDecode,
    /// Encodes pixels into latents
    VAEEncode,
    /// Any other node class
    Other(String),
}

impl ClassType {
    /// Wire spelling of the class
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SaveImage => "SaveImage",
            Self::PreviewImage => "PreviewImage",
            Self::LoadImage => "LoadImage",
            Self::CheckpointLoaderSimple => "CheckpointLoaderSimple",
            Self::CLIPTextEncode => "CLIPTextEncode",
            Self::EmptyLatentImage => "EmptyLatentImage",
            Self::KSampler => "KSampler",
            Self::VAEDecode => "VAEDecode",
            Self::VAEEncode => "VAEEncode",
            Self::Other(name) => name,
        }
    }

    /// Whether this class designates the retrieval output node
    #[inline]
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, Self::SaveImage)
    }
}

impl From<&str> for ClassType {
    fn from(name: &str) -> Self {
        match name {
            "SaveImage" => Self::SaveImage,
            "PreviewImage" => Self::PreviewImage,
            "LoadImage" => Self::LoadImage,
            "CheckpointLoaderSimple" => Self::CheckpointLoaderSimple,
            "CLIPTextEncode" => Self::CLIPTextEncode,
            "EmptyLatentImage" => Self::EmptyLatentImage,
            "KSampler" => Self::KSampler,
            "VAEDecode" => Self::VAEDecode,
            "VAEEncode" => Self::VAEEncode,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ClassType {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Other(_) => Self::Other(name),
            known => known,
        }
    }
}

impl From<ClassType> for String {
    fn from(class_type: ClassType) -> Self {
        match class_type {
            ClassType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for ClassType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a job graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node behaviour
    pub class_type: ClassType,
    /// Every other field, kept as raw JSON
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl NodeSpec {
    /// Create a node with no parameters
    #[inline]
    #[must_use]
    pub fn new(class_type: impl Into<ClassType>) -> Self {
        Self {
            class_type: class_type.into(),
            params: Map::new(),
        }
    }

    /// With a top-level parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// With an entry in the `inputs` object (created if missing)
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_input(key, value);
        self
    }

    /// Set an entry in the `inputs` object, creating the object if needed
    pub fn set_input(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let inputs = self
            .params
            .entry(INPUTS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !inputs.is_object() {
            *inputs = Value::Object(Map::new());
        }
        if let Value::Object(map) = inputs {
            map.insert(key.into(), value.into());
        }
    }

    /// Look up an entry of the `inputs` object
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.params.get(INPUTS_KEY)?.get(key)
    }

    /// Convert to the wire representation
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut map = Map::with_capacity(self.params.len() + 1);
        map.insert(CLASS_TYPE_KEY.to_string(), Value::String(self.class_type.into()));
        map.extend(self.params);
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn class_type_round_trips_known_and_unknown_names() {
        assert_eq!(ClassType::from("SaveImage"), ClassType::SaveImage);
        assert_eq!(ClassType::from("KSampler").as_str(), "KSampler");

        let custom = ClassType::from("UpscaleModelLoader".to_string());
        assert_eq!(custom, ClassType::Other("UpscaleModelLoader".to_string()));
        assert_eq!(String::from(custom), "UpscaleModelLoader");
    }

    #[test]
    fn only_save_image_is_output() {
        assert!(ClassType::SaveImage.is_output());
        assert!(!ClassType::PreviewImage.is_output());
        assert!(!ClassType::Other("SaveImageExtended".into()).is_output());
    }

    #[test]
    fn node_spec_serializes_flat() {
        let node = NodeSpec::new(ClassType::KSampler)
            .with_input("seed", 5)
            .with_param("_meta", json!({"title": "sampler"}));

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({
                "class_type": "KSampler",
                "inputs": {"seed": 5},
                "_meta": {"title": "sampler"}
            })
        );
        assert_eq!(node.clone().into_value(), value);
    }

    #[test]
    fn node_spec_deserializes_unknown_class() {
        let node: NodeSpec =
            serde_json::from_value(json!({"class_type": "Foo", "seed": 5})).unwrap();
        assert_eq!(node.class_type, ClassType::Other("Foo".into()));
        assert_eq!(node.params.get("seed"), Some(&json!(5)));
        assert_eq!(node.input("seed"), None);
    }

    #[test]
    fn set_input_replaces_non_object_inputs() {
        let mut node = NodeSpec::new("LoadImage").with_param("inputs", "bogus");
        node.set_input("image", "cat.png");
        assert_eq!(node.input("image"), Some(&json!("cat.png")));
    }
}
