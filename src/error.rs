//! Error types for plugin schemas

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Domain;
use crate::engine::EngineError;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema subsystem errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("unable to read schema directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown {domain} plugin kind {kind:?}{}", suggestion_hint(.suggestion))]
    UnknownKind {
        domain: Domain,
        kind: String,
        suggestion: Option<String>,
    },

    #[error("invalid {domain} plugin {kind:?}: {source}")]
    Validation {
        domain: Domain,
        kind: String,
        #[source]
        source: EngineError,
    },

    #[error("{name}: {source}")]
    Element {
        name: String,
        #[source]
        source: Box<SchemaError>,
    },

    #[error("plugin {kind:?} declares version {found} but the registered schema is {expected}")]
    VersionMismatch {
        kind: String,
        expected: String,
        found: String,
    },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("unable to convert foreign {element} of type {foreign_type:?}: {reason}")]
    MigrationBadInput {
        element: String,
        foreign_type: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("Schema engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    MetricsEncoding(String),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean {:?}?)", s),
        None => String::new(),
    }
}

impl SchemaError {
    /// Attribute an error to a named dashboard element
    pub fn in_element(self, name: impl Into<String>) -> Self {
        SchemaError::Element {
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past any element prefixes
    pub fn root_cause(&self) -> &SchemaError {
        match self {
            SchemaError::Element { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
