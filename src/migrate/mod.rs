//! Migration Engine
//!
//! Converts a foreign dashboard into a [`NativeDashboard`]. Structure
//! (panel keys, layouts, text variables) is converted in code; plugin
//! payloads are produced by per-kind migration scripts written in the schema
//! notation.
//!
//! A script receives the foreign element as a definition field of the
//! unified value (`#panel`, `#target` or `#var`) and marshals to the
//! `{kind, spec}` of the native plugin. A script that marshals to nothing
//! does not apply.
//!
//! ```text
//! foreign JSON ──► ForeignDashboard ──► panels ──► layouts ──► variables
//!                  (rows recomposed)     │
//!                                        └─► scripts (#panel / #target / #var)
//! ```

mod foreign;
mod layout;
mod panel;
mod scripts;
mod variable;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value as Json;
use thiserror::Error;
use tracing::{info, warn};

pub use foreign::{ForeignDashboard, ForeignLink, ForeignPanel, ForeignVariable, GridPos, ROW_TYPE};
pub use panel::{MARKDOWN_KIND, UNSUPPORTED_PANEL_TEXT};
pub use scripts::{MigrationScript, QueryScript, ScriptRegistry, FOREIGN_TYPE_FIELD, QUERY_KIND_FIELD};
pub use variable::{STATIC_LIST_KIND, UNSUPPORTED_VARIABLE_VALUES};

use crate::config::MigrationConfig;
use crate::dashboard::{
    DashboardMetadata, DashboardSpec, Display, NativeDashboard, DASHBOARD_KIND,
};
use crate::domain::Domain;
use crate::engine::{EngineError, JsonEngine, SchemaEngine};
use crate::error::Result;
use crate::plugin::PluginDescriptor;
use crate::references::undefined_variables;
use crate::registry::SchemaRegistry;

/// Where a script finds the foreign element it converts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Panel,
    Query,
    Variable,
}

impl Scope {
    /// Definition field the foreign element is bound to
    pub fn definition(&self) -> &'static str {
        match self {
            Scope::Panel => "#panel",
            Scope::Query => "#target",
            Scope::Variable => "#var",
        }
    }
}

/// Why a script could not convert an element
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("script output is not a plugin: {0}")]
    Output(#[from] serde_json::Error),
}

pub struct MigrationEngine<E: SchemaEngine = JsonEngine> {
    engine: Arc<E>,
    scripts: ScriptRegistry<E::Value>,
    config: MigrationConfig,
}

impl<E: SchemaEngine> MigrationEngine<E> {
    /// Compile the migration scripts found below the given domain roots
    pub fn load(
        engine: Arc<E>,
        roots: &[(Domain, PathBuf)],
        config: MigrationConfig,
    ) -> Result<Self> {
        let scripts = ScriptRegistry::load(engine.as_ref(), roots)?;
        Ok(Self {
            engine,
            scripts,
            config,
        })
    }

    /// Compile the migration scripts of every domain the registry serves
    pub fn from_registry(registry: &SchemaRegistry<E>, config: MigrationConfig) -> Result<Self> {
        let roots: Vec<(Domain, PathBuf)> = registry
            .loaders()
            .map(|loader| (loader.domain(), loader.root().to_path_buf()))
            .collect();
        Self::load(registry.shared_engine(), &roots, config)
    }

    pub fn scripts(&self) -> &ScriptRegistry<E::Value> {
        &self.scripts
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Migrate a parsed foreign dashboard
    pub fn migrate(&self, foreign: &ForeignDashboard) -> Result<NativeDashboard> {
        let panels = self.migrate_panels(foreign)?;
        let variables = self.migrate_variables(&foreign.variables);
        let layouts = layout::build_layouts(&foreign.panels);

        info!(
            dashboard = %foreign.uid,
            panels = panels.len(),
            variables = variables.len(),
            layouts = layouts.len(),
            "dashboard migrated"
        );

        let dashboard = NativeDashboard {
            kind: DASHBOARD_KIND.to_string(),
            metadata: DashboardMetadata {
                name: foreign.uid.clone(),
            },
            spec: DashboardSpec {
                display: Display {
                    name: foreign.title.clone(),
                    description: None,
                },
                duration: self.config.duration.clone(),
                variables,
                panels,
                layouts,
            },
        };

        for name in undefined_variables(&dashboard) {
            warn!(dashboard = %foreign.uid, variable = %name, "migrated plugins reference an undefined variable");
        }
        Ok(dashboard)
    }

    /// Substitute the input values, parse, then migrate
    pub fn migrate_raw(
        &self,
        bytes: &[u8],
        inputs: &BTreeMap<String, String>,
    ) -> Result<NativeDashboard> {
        let foreign: ForeignDashboard = if inputs.is_empty() {
            serde_json::from_slice(bytes)?
        } else {
            let text = String::from_utf8_lossy(bytes);
            serde_json::from_str(&replace_input_values(&text, inputs))?
        };
        self.migrate(&foreign)
    }

    /// Run one script against one foreign element.
    ///
    /// `Ok(None)` when the script marshals to null or to an empty object.
    pub fn execute_script(
        &self,
        script: &E::Value,
        scope: Scope,
        element: &Json,
    ) -> std::result::Result<Option<PluginDescriptor>, ScriptError> {
        let mut wrapped = serde_json::Map::new();
        wrapped.insert(scope.definition().to_string(), element.clone());
        let data = self.engine.from_json(&Json::Object(wrapped));

        let unified = self.engine.unify(script, &data)?;
        match self.engine.marshal(&unified)? {
            Json::Null => Ok(None),
            Json::Object(map) if map.is_empty() => Ok(None),
            output => Ok(Some(serde_json::from_value(output)?)),
        }
    }
}

/// Replace `$name` and `${name}` with the JSON-escaped input value. Longer
/// names go first so that `$cluster_name` is not eaten by `$cluster`.
pub fn replace_input_values(dashboard: &str, inputs: &BTreeMap<String, String>) -> String {
    let mut names: Vec<&String> = inputs.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut result = dashboard.to_string();
    for name in names {
        let escaped = escape_json(&inputs[name]);
        result = result.replace(&format!("${{{}}}", name), &escaped);
        result = result.replace(&format!("${}", name), &escaped);
    }
    result
}

/// The body of a JSON string literal holding `value`
fn escape_json(value: &str) -> String {
    let quoted = Json::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceFile;
    use serde_json::json;

    fn engine() -> MigrationEngine {
        MigrationEngine::load(Arc::new(JsonEngine), &[], MigrationConfig::default()).unwrap()
    }

    fn script(doc: Json) -> crate::engine::Value {
        JsonEngine
            .compile(&SourceFile::new("migrate.json", doc.to_string()))
            .unwrap()
            .value
    }

    #[test]
    fn test_replace_input_values() {
        let inputs = BTreeMap::from([
            ("DS".to_string(), "prom \"main\"".to_string()),
            ("DS_LONG".to_string(), "other".to_string()),
        ]);
        let replaced = replace_input_values(r#"{"a": "$DS", "b": "${DS}", "c": "$DS_LONG"}"#, &inputs);
        assert_eq!(replaced, r#"{"a": "prom \"main\"", "b": "prom \"main\"", "c": "other"}"#);
    }

    #[test]
    fn test_execute_script_produces_plugin() {
        let script = script(json!({
            "x-package": "migrate",
            "#panel": {"$open": true, "type": "text", "options": {"$open": true, "content": {"$type": "string"}}},
            "kind": "Markdown",
            "spec": {"text": {"$ref": "#panel.options.content"}}
        }));
        let raw = json!({"type": "text", "options": {"content": "# Hello", "mode": "markdown"}});

        let plugin = engine()
            .execute_script(&script, Scope::Panel, &raw)
            .unwrap()
            .unwrap();
        assert_eq!(plugin, PluginDescriptor::new("Markdown", json!({"text": "# Hello"})));
    }

    #[test]
    fn test_execute_script_empty_result_does_not_apply() {
        let script = script(json!({
            "x-package": "migrate",
            "$if": {"$ref": "#target.expr"},
            "$then": {"kind": "PrometheusTimeSeriesQuery", "spec": {"query": {"$ref": "#target.expr"}}}
        }));

        let engine = engine();
        assert!(engine
            .execute_script(&script, Scope::Query, &json!({"refId": "A"}))
            .unwrap()
            .is_none());
        let plugin = engine
            .execute_script(&script, Scope::Query, &json!({"expr": "up"}))
            .unwrap()
            .unwrap();
        assert_eq!(plugin.spec, json!({"query": "up"}));
    }

    #[test]
    fn test_execute_script_conflict_is_an_error() {
        let script = script(json!({
            "x-package": "migrate",
            "#panel": {"$open": true, "type": "text"},
            "kind": "Markdown"
        }));
        let err = engine()
            .execute_script(&script, Scope::Panel, &json!({"type": "graph"}))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Engine(EngineError::Conflict { .. })));
    }
}
