//! Plugin Schemas
//!
//! Schema subsystem of a dashboard platform whose plugins (panels, queries,
//! datasources, variables) are described by external, hot-reloadable
//! schemas, one per plugin kind.
//!
//! ## Features
//!
//! - **Hot Reload**: Each domain is rebuilt from disk and published as an
//!   immutable snapshot; a reload that loads nothing keeps the previous one
//! - **Validation**: Plugins are unified with their schema under closed-field,
//!   fully-concrete semantics
//! - **Tree Decoding**: Schemas flatten into a field tree used to derive
//!   default plugin payloads
//! - **Migration**: Foreign dashboards are converted by per-kind migration
//!   scripts written in the schema notation
//!
//! ## Architecture
//!
//! ```text
//! schemas/
//! ├── panels/
//! │   ├── timeseries/
//! │   │   ├── model.json          (x-package: model)
//! │   │   └── migrate/
//! │   │       └── migrate.json    (x-package: migrate)
//! │   └── markdown/
//! ├── queries/
//! ├── datasources/
//! └── variables/
//!
//! SchemaWatcher  ─┐
//! SchemaReloader ─┴► SchemaLoader (per domain) ──► snapshot swap
//!                                                    │
//!                      SchemaValidator, SchemaTreeDecoder read snapshots
//! ```

pub mod checksum;
pub mod config;
pub mod dashboard;
pub mod decoder;
pub mod domain;
pub mod engine;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod migrate;
pub mod payload;
pub mod plugin;
pub mod references;
pub mod registry;
pub mod validator;
pub mod watcher;

pub use checksum::Checksum;
pub use config::SchemaConfig;
pub use dashboard::NativeDashboard;
pub use decoder::{SchemaNode, SchemaTreeDecoder, SchemaVisitor};
pub use domain::Domain;
pub use engine::{JsonEngine, SchemaEngine};
pub use error::{Result, SchemaError};
pub use loader::{DomainSnapshot, LoadOutcome, LoadedSchema, SchemaLoader};
pub use metrics::{LoadKind, LoadMetrics};
pub use migrate::{ForeignDashboard, MigrationEngine};
pub use plugin::PluginDescriptor;
pub use registry::SchemaRegistry;
pub use validator::SchemaValidator;
pub use watcher::{SchemaReloader, SchemaWatcher};
