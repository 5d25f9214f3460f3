//! Migration script registry
//!
//! Scripts live next to the model sources of a plugin, in a `migrate`
//! folder. They are compiled once when the migration engine is built.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dashboard::DEFAULT_QUERY_KIND;
use crate::domain::{declares_package, Domain, MIGRATE_DIR, MIGRATE_PACKAGE};
use crate::engine::{SchemaEngine, SourceFile};
use crate::error::{Result, SchemaError};
use crate::loader::json_files;

/// Marker of the foreign panel types a panel script handles
pub const FOREIGN_TYPE_FIELD: &str = "#foreignType";
/// Native query kind produced by a query script
pub const QUERY_KIND_FIELD: &str = "#queryKind";

/// A compiled migration script
#[derive(Debug, Clone)]
pub struct MigrationScript<V> {
    /// Plugin folder the script belongs to
    pub source: PathBuf,
    pub value: V,
}

#[derive(Debug, Clone)]
pub struct QueryScript<V> {
    pub script: MigrationScript<V>,
    pub query_kind: String,
}

/// Every migration script, by domain
#[derive(Debug)]
pub struct ScriptRegistry<V> {
    /// Foreign panel type to script; aliases share one script
    panels: BTreeMap<String, MigrationScript<V>>,
    queries: Vec<QueryScript<V>>,
    variables: Vec<MigrationScript<V>>,
}

impl<V> Default for ScriptRegistry<V> {
    fn default() -> Self {
        Self {
            panels: BTreeMap::new(),
            queries: Vec::new(),
            variables: Vec::new(),
        }
    }
}

impl<V: Clone> ScriptRegistry<V> {
    /// Discover and compile the scripts below each domain root. Domains
    /// without migrations are ignored.
    pub fn load<E>(engine: &E, roots: &[(Domain, PathBuf)]) -> Result<Self>
    where
        E: SchemaEngine<Value = V>,
    {
        let mut registry = Self::default();

        for (domain, root) in roots {
            if !domain.has_migrations() {
                continue;
            }
            fs::read_dir(root).map_err(|source| SchemaError::DirectoryUnreadable {
                path: root.clone(),
                source,
            })?;

            for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(domain = %domain, error = %e, "unable to read plugin folder");
                        continue;
                    }
                };
                let folder = entry.path().join(MIGRATE_DIR);
                if !entry.file_type().is_dir() || !folder.is_dir() {
                    continue;
                }
                match compile_script(engine, &folder) {
                    Ok(Some(value)) => registry.register(engine, *domain, entry.path(), value),
                    Ok(None) => debug!(path = %folder.display(), "no migrate package, skipping"),
                    Err(e) => {
                        warn!(path = %folder.display(), error = %e, "unable to load migration script")
                    }
                }
            }
        }

        info!(
            panels = registry.panels.len(),
            queries = registry.queries.len(),
            variables = registry.variables.len(),
            "migration scripts loaded"
        );
        Ok(registry)
    }

    fn register<E>(&mut self, engine: &E, domain: Domain, source: &Path, value: V)
    where
        E: SchemaEngine<Value = V>,
    {
        let script = MigrationScript {
            source: source.to_path_buf(),
            value,
        };

        match domain {
            Domain::Panel => {
                let types = foreign_types(engine, &script.value);
                if types.is_empty() {
                    warn!(
                        path = %source.display(),
                        "panel migration script declares no {}, skipping", FOREIGN_TYPE_FIELD
                    );
                    return;
                }
                for foreign_type in types {
                    if let Some(first) = self.panels.get(&foreign_type) {
                        warn!(
                            foreign_type = %foreign_type,
                            first = %first.source.display(),
                            ignored = %source.display(),
                            "foreign panel type already has a migration script"
                        );
                        continue;
                    }
                    self.panels.insert(foreign_type, script.clone());
                }
            }
            Domain::Query => {
                let query_kind = engine
                    .lookup_string(&script.value, QUERY_KIND_FIELD)
                    .unwrap_or_else(|| DEFAULT_QUERY_KIND.to_string());
                self.queries.push(QueryScript { script, query_kind });
            }
            Domain::Variable => self.variables.push(script),
            Domain::Datasource => {}
        }
    }

    pub fn panel(&self, foreign_type: &str) -> Option<&MigrationScript<V>> {
        self.panels.get(foreign_type)
    }

    /// Foreign panel types with a script, sorted
    pub fn panel_types(&self) -> impl Iterator<Item = &str> {
        self.panels.keys().map(String::as_str)
    }

    /// Query scripts in registration order
    pub fn queries(&self) -> &[QueryScript<V>] {
        &self.queries
    }

    /// Variable scripts in registration order
    pub fn variables(&self) -> &[MigrationScript<V>] {
        &self.variables
    }
}

/// Unify every migrate-package file of a `migrate` folder
fn compile_script<E: SchemaEngine>(engine: &E, folder: &Path) -> Result<Option<E::Value>> {
    let mut script: Option<E::Value> = None;

    let files = json_files(folder).map_err(|e| SchemaError::InvalidFormat(e.to_string()))?;
    for path in files {
        let contents = fs::read_to_string(&path)?;
        if !declares_package(&contents, MIGRATE_PACKAGE) {
            continue;
        }
        let compiled = engine.compile(&SourceFile::new(path, contents))?;
        script = Some(match script {
            Some(previous) => engine.unify(&previous, &compiled.value)?,
            None => compiled.value,
        });
    }

    Ok(script)
}

/// The foreign types named by a panel script: one literal or a disjunction
/// of literals
fn foreign_types<E: SchemaEngine>(engine: &E, script: &E::Value) -> Vec<String> {
    let Some(marker) = engine.lookup(script, FOREIGN_TYPE_FIELD) else {
        return Vec::new();
    };
    engine
        .disjuncts(&marker)
        .iter()
        .filter_map(|alt| match engine.marshal(alt) {
            Ok(Json::String(name)) => Some(name),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JsonEngine;
    use tempfile::tempdir;

    fn write_script(root: &Path, plugin: &str, body: &str) {
        let dir = root.join(plugin).join(MIGRATE_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("migrate.json"), body).unwrap();
    }

    #[test]
    fn test_panel_aliases_share_one_script() {
        let dir = tempdir().unwrap();
        write_script(
            dir.path(),
            "table",
            r##"{"x-package": "migrate", "#foreignType": {"$oneOf": ["table", "table-old"]}, "kind": "Table"}"##,
        );

        let registry =
            ScriptRegistry::load(&JsonEngine, &[(Domain::Panel, dir.path().to_path_buf())]).unwrap();
        let types: Vec<_> = registry.panel_types().collect();
        assert_eq!(types, vec!["table", "table-old"]);
        assert_eq!(
            registry.panel("table").unwrap().source,
            registry.panel("table-old").unwrap().source
        );
    }

    #[test]
    fn test_query_scripts_keep_folder_order_and_kind() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "b-tempo", r##"{"x-package": "migrate", "#queryKind": "TraceQuery"}"##);
        write_script(dir.path(), "a-prometheus", r#"{"x-package": "migrate"}"#);

        let registry =
            ScriptRegistry::load(&JsonEngine, &[(Domain::Query, dir.path().to_path_buf())]).unwrap();
        let kinds: Vec<_> = registry.queries().iter().map(|q| q.query_kind.as_str()).collect();
        assert_eq!(kinds, vec![DEFAULT_QUERY_KIND, "TraceQuery"]);
    }

    #[test]
    fn test_model_packages_and_broken_scripts_are_skipped() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "model-only", r#"{"x-package": "model", "kind": "X"}"#);
        write_script(dir.path(), "broken", r#"{"x-package": "migrate", "kind": "#);
        write_script(dir.path(), "static", r#"{"x-package": "migrate", "kind": "StaticListVariable"}"#);

        let registry =
            ScriptRegistry::load(&JsonEngine, &[(Domain::Variable, dir.path().to_path_buf())]).unwrap();
        assert_eq!(registry.variables().len(), 1);
    }

    #[test]
    fn test_panel_script_without_marker_is_skipped() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "text", r#"{"x-package": "migrate", "kind": "Text"}"#);

        let registry =
            ScriptRegistry::load(&JsonEngine, &[(Domain::Panel, dir.path().to_path_buf())]).unwrap();
        assert_eq!(registry.panel_types().count(), 0);
    }
}
