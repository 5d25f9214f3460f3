//! Schema load metrics
//!
//! Successful and failed schema loads, partitioned by domain and by load
//! kind (full rebuild at startup or on schedule, change-triggered rebuild).
//! Counters live on a Prometheus registry and can be exported in text
//! format for scraping.

use std::fmt;

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::domain::Domain;
use crate::error::{Result, SchemaError};

/// Name of the load attempt counter family
pub const LOAD_ATTEMPTS_METRIC: &str = "plugin_schemas_load_attempts_total";

const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILURE: &str = "failure";

/// What started a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    /// Startup or scheduled reload
    Full,
    /// Filesystem change notification
    Change,
}

impl LoadKind {
    pub const ALL: [LoadKind; 2] = [LoadKind::Full, LoadKind::Change];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadKind::Full => "full",
            LoadKind::Change => "change",
        }
    }
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load counters shared by every loader of a registry
#[derive(Clone)]
pub struct LoadMetrics {
    registry: Registry,
    /// Schemas loaded, by `domain`, `load_kind` and `outcome`
    load_attempts: IntCounterVec,
}

/// One row of [`LoadMetrics::report`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadCounter {
    pub domain: Domain,
    pub kind: LoadKind,
    pub succeeded: u64,
    pub failed: u64,
}

impl LoadMetrics {
    /// Counters on a private registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Counters registered on an existing registry, e.g. the one a server
    /// already exposes
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let load_attempts = IntCounterVec::new(
            Opts::new(
                LOAD_ATTEMPTS_METRIC,
                "Plugin schemas loaded, by domain, load kind and outcome",
            ),
            &["domain", "load_kind", "outcome"],
        )?;
        registry.register(Box::new(load_attempts.clone()))?;
        Ok(Self {
            registry,
            load_attempts,
        })
    }

    /// Record the result of one load attempt
    pub fn record(&self, domain: Domain, kind: LoadKind, succeeded: usize, failed: usize) {
        self.load_attempts
            .with_label_values(&[domain.as_str(), kind.as_str(), OUTCOME_SUCCESS])
            .inc_by(succeeded as u64);
        self.load_attempts
            .with_label_values(&[domain.as_str(), kind.as_str(), OUTCOME_FAILURE])
            .inc_by(failed as u64);
    }

    pub fn succeeded(&self, domain: Domain, kind: LoadKind) -> u64 {
        self.load_attempts
            .with_label_values(&[domain.as_str(), kind.as_str(), OUTCOME_SUCCESS])
            .get()
    }

    pub fn failed(&self, domain: Domain, kind: LoadKind) -> u64 {
        self.load_attempts
            .with_label_values(&[domain.as_str(), kind.as_str(), OUTCOME_FAILURE])
            .get()
    }

    /// All counters, in domain then load-kind order
    pub fn report(&self) -> Vec<LoadCounter> {
        Domain::ALL
            .into_iter()
            .flat_map(|domain| LoadKind::ALL.into_iter().map(move |kind| (domain, kind)))
            .map(|(domain, kind)| LoadCounter {
                domain,
                kind,
                succeeded: self.succeeded(domain, kind),
                failed: self.failed(domain, kind),
            })
            .collect()
    }

    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    /// Every metric of the registry in Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| SchemaError::MetricsEncoding(e.to_string()))
    }
}

impl fmt::Debug for LoadMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadMetrics")
            .field("counters", &self.report())
            .finish()
    }
}
