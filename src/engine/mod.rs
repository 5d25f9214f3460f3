//! Schema Engine
//!
//! The capability every other module is written against: compile schema
//! sources, unify values, check concreteness, marshal to JSON, and inspect
//! the structure of a value for tree decoding.
//!
//! [`JsonEngine`] is the bundled implementation over the JSON-encoded schema
//! notation described in [`value`].

mod eval;
mod json;
mod unify;
pub mod value;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::JsonEngine;
pub use value::Value;

// =============================================================================
// Engine Errors
// =============================================================================

/// Errors raised while compiling or evaluating schema values.
///
/// Paths are dotted field paths from the root of the unified value
/// (`spec.options.mode`), empty for the root itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{file}: {message}")]
    Syntax { file: String, message: String },

    #[error("{}: conflicting values {left} and {right}", display_path(path))]
    Conflict {
        path: String,
        left: String,
        right: String,
    },

    #[error("{}: field not allowed", display_path(path))]
    FieldNotAllowed { path: String },

    #[error("{}: incomplete value {value}", display_path(path))]
    Incomplete { path: String, value: String },

    #[error("{}: {message}", display_path(path))]
    Constraint { path: String, message: String },

    #[error("{}: no alternative matched ({reason})", display_path(path))]
    NoMatch { path: String, reason: String },

    #[error("{}: reference cycle or excessive nesting", display_path(path))]
    Cycle { path: String },
}

impl EngineError {
    /// Field path the error refers to, when it has one
    pub fn path(&self) -> Option<&str> {
        match self {
            EngineError::Syntax { .. } => None,
            EngineError::Conflict { path, .. }
            | EngineError::FieldNotAllowed { path }
            | EngineError::Incomplete { path, .. }
            | EngineError::Constraint { path, .. }
            | EngineError::NoMatch { path, .. }
            | EngineError::Cycle { path } => Some(path),
        }
    }

    /// True for errors caused by missing information rather than a conflict
    pub fn is_incomplete(&self) -> bool {
        matches!(self, EngineError::Incomplete { .. })
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

pub(crate) fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

// =============================================================================
// Scalars
// =============================================================================

/// Scalar types a schema field can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Bool,
    Int,
    Float,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::String(_) => ScalarKind::String,
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int(_) => ScalarKind::Int,
            Scalar::Float(_) => ScalarKind::Float,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::String(s) => serde_json::Value::String(s.clone()),
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{:?}", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
        }
    }
}

// =============================================================================
// Sources and Shapes
// =============================================================================

/// One schema source document read from disk (or embedded)
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// A compiled source document with its annotations
#[derive(Debug, Clone)]
pub struct Compiled<V> {
    pub value: V,
    /// Package marker (`x-package`)
    pub package: Option<String>,
    /// Declared schema version (`x-version`)
    pub version: Option<String>,
}

/// Structural view of a value, as seen by the tree decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<V> {
    /// A concrete scalar
    Concrete(Scalar),
    /// A scalar whose type is known but whose value is not
    Incomplete(ScalarKind),
    /// A struct; required regular fields in declaration order
    Struct(Vec<(String, V)>),
    /// A list of any element type
    List,
    /// A choice among alternatives
    Disjunction(Vec<V>),
    /// A pending unification of several values
    Conjunction(Vec<V>),
    /// Anything else (null, top, unresolved references)
    Other,
}

// =============================================================================
// Engine Capability
// =============================================================================

/// The narrow contract the loader, validator, decoder and migration engine
/// depend on. Any evaluator that honors it can be swapped in.
pub trait SchemaEngine: Send + Sync + 'static {
    type Value: Clone + fmt::Debug + Send + Sync + 'static;

    /// Compile one source document
    fn compile(&self, source: &SourceFile) -> Result<Compiled<Self::Value>, EngineError>;

    /// Convert plain JSON data into an engine value
    fn from_json(&self, data: &serde_json::Value) -> Self::Value;

    /// Structural merge; conflicts are errors
    fn unify(&self, a: &Self::Value, b: &Self::Value) -> Result<Self::Value, EngineError>;

    /// Resolve references and conditionals, then require every regular
    /// field to be concrete. Returns the concrete value.
    fn validate_concrete(&self, value: &Self::Value) -> Result<Self::Value, EngineError>;

    /// Marshal a value to JSON; fails when the value is not concrete
    fn marshal(&self, value: &Self::Value) -> Result<serde_json::Value, EngineError>;

    /// Look up a dotted path (definition fields allowed)
    fn lookup(&self, value: &Self::Value, path: &str) -> Option<Self::Value>;

    /// Structural view used by tree decoding
    fn inspect(&self, value: &Self::Value) -> Shape<Self::Value>;

    /// Alternatives of a disjunction; any other value is its own single
    /// alternative
    fn disjuncts(&self, value: &Self::Value) -> Vec<Self::Value> {
        vec![value.clone()]
    }

    /// Look up a path and return it when it is a concrete string
    fn lookup_string(&self, value: &Self::Value, path: &str) -> Option<String> {
        let found = self.lookup(value, path)?;
        match self.marshal(&found).ok()? {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        }
    }
}
