//! Configuration management for plugin schemas
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (plugin-schemas.toml)
//! - Environment variables (PLUGIN_SCHEMAS__*)
//!
//! ## Example config file (plugin-schemas.toml):
//! ```toml
//! [schemas]
//! panels_path = "schemas/panels"
//! queries_path = "schemas/queries"
//! datasources_path = "schemas/datasources"
//! variables_path = "schemas/variables"
//!
//! [reload]
//! enabled = true
//! debounce_ms = 250
//! interval_ms = 21600000
//!
//! [migration]
//! duration = "1h"
//! isolate_panel_failures = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Domain;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Schema directories per domain
    #[serde(default)]
    pub schemas: SchemasConfig,

    /// Hot reload settings
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Migration settings
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Schema directories. A domain without a path is neither loaded nor validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemasConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panels_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasources_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_path: Option<PathBuf>,
}

/// Hot reload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Watch schema directories and reload on change
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period used to batch filesystem events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Period of the scheduled full reload of every domain; 0 disables it
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Default time range of migrated dashboards
    #[serde(default = "default_duration")]
    pub duration: String,

    /// Replace a panel that fails to migrate with a placeholder instead of
    /// failing the whole dashboard
    #[serde(default)]
    pub isolate_panel_failures: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_interval_ms() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_duration() -> String {
    "1h".to_string()
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            isolate_panel_failures: false,
        }
    }
}

impl SchemasConfig {
    /// Configured path of a domain
    pub fn path(&self, domain: Domain) -> Option<&Path> {
        match domain {
            Domain::Panel => self.panels_path.as_deref(),
            Domain::Query => self.queries_path.as_deref(),
            Domain::Datasource => self.datasources_path.as_deref(),
            Domain::Variable => self.variables_path.as_deref(),
        }
    }

    /// Every domain under its conventional directory of one root
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            panels_path: Some(root.join(Domain::Panel.dir_name())),
            queries_path: Some(root.join(Domain::Query.dir_name())),
            datasources_path: Some(root.join(Domain::Datasource.dir_name())),
            variables_path: Some(root.join(Domain::Variable.dir_name())),
        }
    }
}

impl ReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Period of the scheduled full reload, if any
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

impl SchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "plugin-schemas.toml",
            ".plugin-schemas.toml",
            "config/plugin-schemas.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "dashboards", "plugin-schemas") {
            let xdg_config = config_dir.config_dir().join("plugin-schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (PLUGIN_SCHEMAS__*)
        builder = builder.add_source(
            Environment::with_prefix("PLUGIN_SCHEMAS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Configured domains with their resolved (absolute) paths
    pub fn domain_paths(&self) -> Vec<(Domain, PathBuf)> {
        Domain::ALL
            .into_iter()
            .filter_map(|domain| {
                self.schemas
                    .path(domain)
                    .map(|p| (domain, resolve_path(p)))
            })
            .collect()
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}
