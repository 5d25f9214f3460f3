//! Schema Loader
//!
//! Scans one domain directory, compiles one schema per plugin folder, keys the
//! result by the declared `kind`, and publishes it as an immutable snapshot.
//!
//! Every load is a full rebuild of the domain. A load that accepts nothing
//! while rejecting at least one candidate keeps the previous snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::domain::{declares_package, Domain, MODEL_PACKAGE};
use crate::engine::{EngineError, SchemaEngine, SourceFile};
use crate::error::{Result, SchemaError};
use crate::metrics::{LoadKind, LoadMetrics};

// =============================================================================
// Snapshots
// =============================================================================

/// A compiled schema bound to its kind
#[derive(Debug, Clone)]
pub struct LoadedSchema<V> {
    pub kind: String,
    pub value: V,
    /// Plugin folder the schema was compiled from
    pub source: PathBuf,
    pub checksum: Checksum,
    pub version: Option<semver::Version>,
}

/// Immutable `{kind -> schema}` view of one domain
#[derive(Debug)]
pub struct DomainSnapshot<V> {
    pub domain: Domain,
    schemas: BTreeMap<String, LoadedSchema<V>>,
    digest: Checksum,
    loaded_at: DateTime<Utc>,
}

impl<V> DomainSnapshot<V> {
    fn new(domain: Domain, schemas: BTreeMap<String, LoadedSchema<V>>) -> Self {
        let digest = Checksum::digest(
            schemas
                .iter()
                .map(|(kind, schema)| (kind.as_str(), &schema.checksum)),
        );
        Self {
            domain,
            schemas,
            digest,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty(domain: Domain) -> Self {
        Self::new(domain, BTreeMap::new())
    }

    pub fn get(&self, kind: &str) -> Option<&LoadedSchema<V>> {
        self.schemas.get(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &LoadedSchema<V>> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Digest over every `(kind, checksum)` pair
    pub fn digest(&self) -> &Checksum {
        &self.digest
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

// =============================================================================
// Load Results
// =============================================================================

/// Why one plugin folder was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadFailure {
    #[error("unable to read schema sources: {0}")]
    Read(String),

    #[error("compilation failed: {0}")]
    Compile(EngineError),

    #[error("does not satisfy the {domain} envelope: {source}")]
    Envelope { domain: Domain, source: EngineError },

    #[error("no concrete `kind` declared")]
    MissingKind,

    #[error("kind {kind:?} is already registered by {}", .first.display())]
    DuplicateKind { kind: String, first: PathBuf },

    #[error("invalid x-version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },
}

/// Outcome of one load attempt
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub domain: Domain,
    pub kind: LoadKind,
    pub succeeded: usize,
    pub failures: Vec<(PathBuf, LoadFailure)>,
    /// False when the previous snapshot was kept
    pub published: bool,
}

impl LoadOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Loads and hot-reloads the schemas of one domain
pub struct SchemaLoader<E: SchemaEngine> {
    domain: Domain,
    root: PathBuf,
    engine: Arc<E>,
    envelope: Option<E::Value>,
    snapshot: ArcSwap<DomainSnapshot<E::Value>>,
    reload_lock: Mutex<()>,
    pending: AtomicBool,
    metrics: Arc<LoadMetrics>,
}

impl<E: SchemaEngine> SchemaLoader<E> {
    /// Create a loader with an empty snapshot. Nothing is read until
    /// [`load`](Self::load) is called.
    pub fn new(
        domain: Domain,
        root: impl Into<PathBuf>,
        engine: Arc<E>,
        metrics: Arc<LoadMetrics>,
    ) -> Result<Self> {
        let envelope = match domain.envelope() {
            Some(source) => Some(engine.compile(&source)?.value),
            None => None,
        };

        Ok(Self {
            domain,
            root: root.into(),
            engine,
            envelope,
            snapshot: ArcSwap::from_pointee(DomainSnapshot::empty(domain)),
            reload_lock: Mutex::new(()),
            pending: AtomicBool::new(false),
            metrics,
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current snapshot. Readers keep the snapshot they loaded even if a
    /// reload publishes a new one meanwhile.
    pub fn snapshot(&self) -> Arc<DomainSnapshot<E::Value>> {
        self.snapshot.load_full()
    }

    /// Rebuild the domain, waiting for any reload in progress.
    pub fn load(&self, kind: LoadKind) -> Result<LoadOutcome> {
        let _guard = self.reload_lock.lock();
        self.load_locked(kind)
    }

    /// Request a rebuild without waiting. When a reload is already running
    /// the request is folded into one more pass of that reload and `None`
    /// is returned.
    pub fn trigger(&self, kind: LoadKind) -> Option<Result<LoadOutcome>> {
        self.pending.store(true, Ordering::Release);

        let mut last = None;
        loop {
            let Some(guard) = self.reload_lock.try_lock() else {
                debug!(domain = %self.domain, "reload in progress, request coalesced");
                return last;
            };
            while self.pending.swap(false, Ordering::AcqRel) {
                last = Some(self.load_locked(kind));
            }
            drop(guard);

            // A trigger may have landed between the last swap and the unlock.
            if !self.pending.load(Ordering::Acquire) {
                return last;
            }
        }
    }

    fn load_locked(&self, kind: LoadKind) -> Result<LoadOutcome> {
        fs::read_dir(&self.root).map_err(|source| SchemaError::DirectoryUnreadable {
            path: self.root.clone(),
            source,
        })?;

        let mut schemas: BTreeMap<String, LoadedSchema<E::Value>> = BTreeMap::new();
        let mut failures = Vec::new();

        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    failures.push((path, LoadFailure::Read(e.to_string())));
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            match self.load_candidate(dir) {
                Ok(None) => debug!(path = %dir.display(), "no model package, skipping"),
                Ok(Some(schema)) => match schemas.get(&schema.kind) {
                    Some(first) => {
                        let failure = LoadFailure::DuplicateKind {
                            kind: schema.kind.clone(),
                            first: first.source.clone(),
                        };
                        failures.push((dir.to_path_buf(), failure));
                    }
                    None => {
                        schemas.insert(schema.kind.clone(), schema);
                    }
                },
                Err(failure) => failures.push((dir.to_path_buf(), failure)),
            }
        }

        for (path, failure) in &failures {
            error!(domain = %self.domain, path = %path.display(), error = %failure, "unable to load schema");
        }

        let succeeded = schemas.len();
        self.metrics.record(self.domain, kind, succeeded, failures.len());

        let published = !(succeeded == 0 && !failures.is_empty());
        if published {
            let snapshot = DomainSnapshot::new(self.domain, schemas);
            info!(
                domain = %self.domain,
                load = %kind,
                succeeded,
                failed = failures.len(),
                digest = snapshot.digest().short(),
                "schemas loaded"
            );
            self.snapshot.store(Arc::new(snapshot));
        } else {
            warn!(
                domain = %self.domain,
                load = %kind,
                failed = failures.len(),
                "no schema could be loaded, keeping the previous registry"
            );
        }

        Ok(LoadOutcome {
            domain: self.domain,
            kind,
            succeeded,
            failures,
            published,
        })
    }

    /// Compile one plugin folder. `Ok(None)` when the folder holds no model
    /// package.
    fn load_candidate(
        &self,
        dir: &Path,
    ) -> std::result::Result<Option<LoadedSchema<E::Value>>, LoadFailure> {
        let mut sources = Vec::new();
        let mut values = Vec::new();
        let mut version = None;

        for path in json_files(dir).map_err(|e| LoadFailure::Read(e.to_string()))? {
            let contents =
                fs::read_to_string(&path).map_err(|e| LoadFailure::Read(e.to_string()))?;
            if !declares_package(&contents, MODEL_PACKAGE) {
                trace!(path = %path.display(), "not a model source, skipping");
                continue;
            }
            let source = SourceFile::new(path, contents);
            let compiled = self.engine.compile(&source).map_err(LoadFailure::Compile)?;
            if version.is_none() {
                version = compiled.version;
            }
            values.push(compiled.value);
            sources.push(source);
        }

        let Some((first, rest)) = values.split_first() else {
            return Ok(None);
        };

        let mut value = first.clone();
        for other in rest {
            value = self.engine.unify(&value, other).map_err(LoadFailure::Compile)?;
        }

        if let Some(envelope) = &self.envelope {
            value = self
                .engine
                .unify(envelope, &value)
                .map_err(|source| LoadFailure::Envelope {
                    domain: self.domain,
                    source,
                })?;
        }

        let kind = self
            .engine
            .lookup_string(&value, "kind")
            .ok_or(LoadFailure::MissingKind)?;

        let version = version
            .map(|v| {
                semver::Version::parse(&v).map_err(|e| LoadFailure::InvalidVersion {
                    version: v.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        debug!(domain = %self.domain, kind = %kind, path = %dir.display(), "schema compiled");

        Ok(Some(LoadedSchema {
            kind,
            value,
            source: dir.to_path_buf(),
            checksum: Checksum::from_sources(&sources),
            version,
        }))
    }
}

/// `*.json` files directly inside a folder, sorted by name
pub(crate) fn json_files(dir: &Path) -> std::result::Result<Vec<PathBuf>, walkdir::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
