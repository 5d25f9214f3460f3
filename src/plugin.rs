//! Plugin descriptors

use serde::{Deserialize, Serialize};

/// The `{kind, spec}` pair every plugin is described by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PluginMetadata>,

    #[serde(default = "empty_spec")]
    pub spec: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

fn empty_spec() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl PluginDescriptor {
    pub fn new(kind: impl Into<String>, spec: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            metadata: None,
            spec,
        }
    }

    /// Declared plugin version, if any
    pub fn version(&self) -> Option<&str> {
        self.metadata.as_ref()?.version.as_deref()
    }

    /// The value unified against a schema: metadata is not part of it
    pub fn to_unification_input(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "spec": self.spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_defaults_to_empty_object() {
        let plugin: PluginDescriptor = serde_json::from_str(r#"{"kind": "Text"}"#).unwrap();
        assert_eq!(plugin.spec, serde_json::json!({}));
        assert!(plugin.version().is_none());
    }

    #[test]
    fn test_metadata_round_trip() {
        let raw = r#"{"kind":"Text","metadata":{"version":"0.2.0"},"spec":{"a":1}}"#;
        let plugin: PluginDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(plugin.version(), Some("0.2.0"));
        assert_eq!(serde_json::to_string(&plugin).unwrap(), raw);
    }
}
