//! Default plugin payloads
//!
//! Builds a plausible plugin descriptor for an arbitrary kind from its
//! decoded schema tree: concrete values are kept, placeholders get zero
//! values, and any `HTTPProxy` struct receives the discovered endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decoder::{SchemaNode, SchemaVisitor};
use crate::engine::{Scalar, ScalarKind};
use crate::error::{Result, SchemaError};
use crate::plugin::PluginDescriptor;

pub const HTTP_PROXY_KIND: &str = "HTTPProxy";

/// Spec injected into `HTTPProxy` structs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxyConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl HttpProxyConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

struct PayloadBuilder {
    root: Map<String, Value>,
    /// Open structs, innermost last
    stack: Vec<(String, Map<String, Value>)>,
    proxy: Option<Value>,
}

impl PayloadBuilder {
    fn current(&mut self) -> &mut Map<String, Value> {
        match self.stack.last_mut() {
            Some((_, map)) => map,
            None => &mut self.root,
        }
    }
}

impl SchemaVisitor for PayloadBuilder {
    fn visit_scalar(&mut self, field_name: &str, scalar_type: ScalarKind, value: Option<&Scalar>) {
        let value = match value {
            Some(scalar) => scalar.to_json(),
            None => zero_value(scalar_type),
        };
        self.current().insert(field_name.to_string(), value);
    }

    fn enter_struct(&mut self, field_name: &str) {
        self.stack.push((field_name.to_string(), Map::new()));
    }

    fn leave_struct(&mut self, _field_name: &str) {
        let Some((name, mut map)) = self.stack.pop() else {
            return;
        };
        if let Some(proxy) = &self.proxy {
            if map.get("kind").and_then(Value::as_str) == Some(HTTP_PROXY_KIND) {
                map.insert("spec".to_string(), proxy.clone());
            }
        }
        self.current().insert(name, Value::Object(map));
    }

    fn visit_list(&mut self, field_name: &str) {
        self.current().insert(field_name.to_string(), Value::Array(Vec::new()));
    }
}

fn zero_value(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::String => Value::String(String::new()),
        ScalarKind::Bool => Value::Bool(false),
        ScalarKind::Int => Value::from(0),
        ScalarKind::Float => Value::from(0.0),
    }
}

/// Build a default payload from the `[kind, spec]` tree of a plugin schema
pub fn build_default_payload(nodes: &[SchemaNode]) -> Result<PluginDescriptor> {
    build(nodes, None)
}

/// Build a default payload and inject a proxy wherever the schema declares
/// an `HTTPProxy`
pub fn build_payload_with_proxy(
    nodes: &[SchemaNode],
    proxy: &HttpProxyConfig,
) -> Result<PluginDescriptor> {
    build(nodes, Some(serde_json::to_value(proxy)?))
}

fn build(nodes: &[SchemaNode], proxy: Option<Value>) -> Result<PluginDescriptor> {
    if nodes.len() != 2 {
        return Err(SchemaError::InvalidFormat(
            "plugin schema must contain only `kind` and `spec` at its root".to_string(),
        ));
    }

    let mut builder = PayloadBuilder {
        root: Map::new(),
        stack: Vec::new(),
        proxy,
    };
    for node in nodes {
        node.accept(&mut builder);
    }
    let mut root = builder.root;

    let kind = match root.remove("kind") {
        Some(Value::String(kind)) if !kind.is_empty() => kind,
        _ => {
            return Err(SchemaError::InvalidFormat(
                "plugin schema does not declare a concrete `kind`".to_string(),
            ))
        }
    };
    let spec = root
        .remove("spec")
        .unwrap_or_else(|| Value::Object(Map::new()));

    Ok(PluginDescriptor::new(kind, spec))
}
