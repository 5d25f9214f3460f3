//! Schema Registry
//!
//! The set of configured domain loaders. Readers get per-domain snapshots;
//! reloads replace a domain snapshot wholesale.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::SchemaConfig;
use crate::domain::Domain;
use crate::engine::{JsonEngine, SchemaEngine};
use crate::error::Result;
use crate::loader::{DomainSnapshot, LoadOutcome, LoadedSchema, SchemaLoader};
use crate::metrics::{LoadKind, LoadMetrics};

/// Loaders for every configured domain
pub struct SchemaRegistry<E: SchemaEngine = JsonEngine> {
    engine: Arc<E>,
    loaders: BTreeMap<Domain, Arc<SchemaLoader<E>>>,
    metrics: Arc<LoadMetrics>,
}

impl<E: SchemaEngine> SchemaRegistry<E> {
    /// A registry with no configured domain and private load counters
    pub fn new(engine: E) -> Result<Self> {
        Ok(Self::with_metrics(engine, Arc::new(LoadMetrics::new()?)))
    }

    /// A registry recording its loads on caller-provided counters
    pub fn with_metrics(engine: E, metrics: Arc<LoadMetrics>) -> Self {
        Self {
            engine: Arc::new(engine),
            loaders: BTreeMap::new(),
            metrics,
        }
    }

    /// A registry with one loader per configured domain path. Nothing is
    /// loaded yet.
    pub fn from_config(engine: E, config: &SchemaConfig) -> Result<Self> {
        let mut registry = Self::new(engine)?;
        for (domain, path) in config.domain_paths() {
            registry = registry.with_domain(domain, path)?;
        }
        Ok(registry)
    }

    /// Configure (or reconfigure) the directory of one domain
    pub fn with_domain(mut self, domain: Domain, root: impl Into<PathBuf>) -> Result<Self> {
        let loader = SchemaLoader::new(
            domain,
            root,
            Arc::clone(&self.engine),
            Arc::clone(&self.metrics),
        )?;
        self.loaders.insert(domain, Arc::new(loader));
        Ok(self)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine handle, for collaborators that outlive a borrow
    pub fn shared_engine(&self) -> Arc<E> {
        Arc::clone(&self.engine)
    }

    pub fn metrics(&self) -> &LoadMetrics {
        &self.metrics
    }

    pub fn loader(&self, domain: Domain) -> Option<&Arc<SchemaLoader<E>>> {
        self.loaders.get(&domain)
    }

    pub fn loaders(&self) -> impl Iterator<Item = &Arc<SchemaLoader<E>>> {
        self.loaders.values()
    }

    pub fn is_configured(&self, domain: Domain) -> bool {
        self.loaders.contains_key(&domain)
    }

    /// Full rebuild of every configured domain, in domain order. Stops at
    /// the first unreadable directory.
    pub fn load_all(&self) -> Result<Vec<LoadOutcome>> {
        let mut outcomes = Vec::with_capacity(self.loaders.len());
        for loader in self.loaders.values() {
            outcomes.push(loader.load(LoadKind::Full)?);
        }
        info!(
            domains = outcomes.len(),
            schemas = outcomes.iter().map(|o| o.succeeded).sum::<usize>(),
            "registry loaded"
        );
        Ok(outcomes)
    }

    /// Current snapshot of a domain
    pub fn snapshot(&self, domain: Domain) -> Option<Arc<DomainSnapshot<E::Value>>> {
        self.loader(domain).map(|loader| loader.snapshot())
    }

    /// The registered schema of a kind
    pub fn schema(&self, domain: Domain, kind: &str) -> Option<LoadedSchema<E::Value>> {
        self.snapshot(domain)?.get(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemasConfig;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_only_configured_domains_get_loaders() {
        let mut config = SchemaConfig::default();
        config.schemas.panels_path = Some(PathBuf::from("/srv/panels"));

        let registry = SchemaRegistry::from_config(JsonEngine, &config).unwrap();
        assert!(registry.is_configured(Domain::Panel));
        assert!(!registry.is_configured(Domain::Query));
        assert!(registry.snapshot(Domain::Query).is_none());
    }

    #[test]
    fn test_load_all_and_lookup() {
        let dir = tempdir().unwrap();
        let text = dir.path().join("panels/text");
        fs::create_dir_all(&text).unwrap();
        fs::write(text.join("model.json"), r#"{"x-package": "model", "kind": "Text"}"#).unwrap();
        fs::create_dir_all(dir.path().join("variables")).unwrap();

        let mut config = SchemaConfig::default();
        config.schemas = SchemasConfig::from_root(dir.path());
        config.schemas.queries_path = None;
        config.schemas.datasources_path = None;

        let registry = SchemaRegistry::from_config(JsonEngine, &config).unwrap();
        let outcomes = registry.load_all().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(registry.schema(Domain::Panel, "Text").is_some());
        assert!(registry.schema(Domain::Panel, "Chart").is_none());
        assert_eq!(registry.metrics().succeeded(Domain::Panel, LoadKind::Full), 1);
    }
}
