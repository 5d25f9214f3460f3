//! JSON notation engine

use std::sync::OnceLock;

use jsonschema::JSONSchema;
use tracing::trace;

use super::eval::{finalize, inspect, to_json, Evaluator};
use super::unify::unify;
use super::value::{self, Value};
use super::{Compiled, EngineError, SchemaEngine, Shape, SourceFile};

/// Structural rules every schema source must follow before it is parsed
const SOURCE_META_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "x-package": { "enum": ["model", "migrate"] },
    "x-version": { "type": "string" }
  },
  "additionalProperties": { "$ref": "#/definitions/node" },
  "definitions": {
    "node": {
      "if": { "type": "object" },
      "then": {
        "properties": {
          "$type": { "enum": ["string", "bool", "int", "float", "number", "any"] },
          "$pattern": { "type": "string" },
          "$open": { "type": "boolean" },
          "$oneOf": { "type": "array", "minItems": 1, "items": { "$ref": "#/definitions/node" } },
          "$allOf": { "type": "array", "minItems": 1, "items": { "$ref": "#/definitions/node" } },
          "$listOf": { "$ref": "#/definitions/node" },
          "$if": { "type": "object" }
        },
        "additionalProperties": { "$ref": "#/definitions/node" }
      },
      "else": {
        "if": { "type": "array" },
        "then": { "items": { "$ref": "#/definitions/node" } }
      }
    }
  }
}"##;

fn source_meta_schema() -> Result<&'static JSONSchema, String> {
    static META: OnceLock<Result<JSONSchema, String>> = OnceLock::new();
    META.get_or_init(|| {
        let schema: serde_json::Value =
            serde_json::from_str(SOURCE_META_SCHEMA).map_err(|e| e.to_string())?;
        JSONSchema::compile(&schema).map_err(|e| e.to_string())
    })
    .as_ref()
    .map_err(|e| e.clone())
}

/// Engine over the JSON schema notation
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEngine;

impl JsonEngine {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, value: &Value) -> Result<Value, EngineError> {
        Evaluator::new(value).eval(value, "", 0)
    }
}

impl SchemaEngine for JsonEngine {
    type Value = Value;

    fn compile(&self, source: &SourceFile) -> Result<Compiled<Value>, EngineError> {
        let file = source.path.display().to_string();
        let syntax = |message: String| EngineError::Syntax {
            file: file.clone(),
            message,
        };

        let doc: serde_json::Value =
            serde_json::from_str(&source.contents).map_err(|e| syntax(e.to_string()))?;

        let meta = source_meta_schema().map_err(|e| syntax(format!("meta-schema: {}", e)))?;
        if let Err(errors) = meta.validate(&doc) {
            let messages: Vec<String> = errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect();
            return Err(syntax(messages.join("; ")));
        }

        let (value, annotations) = value::parse_document(&doc).map_err(syntax)?;
        trace!(file = %file, package = ?annotations.package, "compiled schema source");

        Ok(Compiled {
            value,
            package: annotations.package,
            version: annotations.version,
        })
    }

    fn from_json(&self, data: &serde_json::Value) -> Value {
        value::from_data(data)
    }

    fn unify(&self, a: &Value, b: &Value) -> Result<Value, EngineError> {
        unify(a, b, "")
    }

    fn validate_concrete(&self, value: &Value) -> Result<Value, EngineError> {
        let evaluated = self.evaluate(value)?;
        finalize(&evaluated, "")
    }

    fn marshal(&self, value: &Value) -> Result<serde_json::Value, EngineError> {
        self.validate_concrete(value).map(|v| to_json(&v))
    }

    fn lookup(&self, value: &Value, path: &str) -> Option<Value> {
        Evaluator::new(value).resolve(path, 0).ok().flatten()
    }

    fn inspect(&self, value: &Value) -> Shape<Value> {
        inspect(value)
    }

    fn disjuncts(&self, value: &Value) -> Vec<Value> {
        match value {
            Value::Disjunction(alts) => alts.clone(),
            other => vec![other.clone()],
        }
    }
}
