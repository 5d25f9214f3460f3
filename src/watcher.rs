//! Schema Watcher
//!
//! Watches every configured domain root and rebuilds the domains whose files
//! changed. Events are batched for the configured debounce period, then each
//! touched domain gets one coalescing reload.
//!
//! [`SchemaReloader`] runs beside the watcher and rebuilds every domain on a
//! fixed period, picking up changes the filesystem never reported.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::config::ReloadConfig;
use crate::domain::Domain;
use crate::engine::SchemaEngine;
use crate::error::Result;
use crate::loader::LoadOutcome;
use crate::metrics::LoadKind;
use crate::registry::SchemaRegistry;

/// Called with the outcomes of every batch of reloads
pub type ReloadCallback = Box<dyn Fn(&[LoadOutcome]) + Send + 'static>;

/// A running watcher. Dropping it stops the watch thread.
pub struct SchemaWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl SchemaWatcher {
    /// Start watching the roots of every configured domain
    pub fn spawn<E: SchemaEngine>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
    ) -> Result<Self> {
        Self::start(registry, config, None)
    }

    /// Like [`spawn`](Self::spawn), running `callback` after each batch
    pub fn spawn_with_callback<E, F>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
        callback: F,
    ) -> Result<Self>
    where
        E: SchemaEngine,
        F: Fn(&[LoadOutcome]) + Send + 'static,
    {
        Self::start(registry, config, Some(Box::new(callback)))
    }

    fn start<E: SchemaEngine>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
        callback: Option<ReloadCallback>,
    ) -> Result<Self> {
        if !config.enabled {
            info!("schema hot reload disabled");
            return Ok(Self {
                watcher: None,
                handle: None,
            });
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // The receiver is gone once the watch thread stopped.
            let _ = tx.send(event);
        })?;

        let mut roots = Vec::new();
        for loader in registry.loaders() {
            let root = loader.root();
            watcher.watch(root, RecursiveMode::Recursive)?;
            debug!(domain = %loader.domain(), root = %root.display(), "watching schema directory");
            roots.extend(watch_roots(loader.domain(), root));
        }

        let debounce = config.debounce();
        let watched = registry.loaders().count();
        let handle = thread::Builder::new()
            .name("schema-watcher".to_string())
            .spawn(move || watch_loop(&registry, &roots, &rx, debounce, callback.as_deref()))?;

        info!(domains = watched, "schema watcher started");
        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop watching and wait for the last batch to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the watcher drops the sender, which ends the loop.
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("schema watcher thread panicked");
            }
        }
    }
}

impl Drop for SchemaWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop<E: SchemaEngine>(
    registry: &SchemaRegistry<E>,
    roots: &[(Domain, PathBuf)],
    rx: &Receiver<notify::Result<Event>>,
    debounce: Duration,
    callback: Option<&(dyn Fn(&[LoadOutcome]) + Send)>,
) {
    while let Ok(first) = rx.recv() {
        let mut dirty = BTreeSet::new();
        collect(first, roots, &mut dirty);

        let deadline = Instant::now() + debounce;
        let mut disconnected = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(event) => collect(event, roots, &mut dirty),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        let outcomes = reload(registry, &dirty, LoadKind::Change);
        if let Some(callback) = callback {
            if !dirty.is_empty() {
                callback(&outcomes);
            }
        }
        if disconnected {
            break;
        }
    }
    debug!("schema watcher stopped");
}

/// Prefixes attributing event paths to a domain. Backends report paths under
/// the root as it was watched, or under its resolved form.
fn watch_roots(domain: Domain, root: &Path) -> Vec<(Domain, PathBuf)> {
    let mut roots = vec![(domain, root.to_path_buf())];
    if let Ok(canonical) = root.canonicalize() {
        if canonical != root {
            roots.push((domain, canonical));
        }
    }
    roots
}

fn collect(
    event: notify::Result<Event>,
    roots: &[(Domain, PathBuf)],
    dirty: &mut BTreeSet<Domain>,
) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "filesystem watch error");
            return;
        }
    };
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    ) {
        return;
    }
    for path in &event.paths {
        if let Some(domain) = domain_of(path, roots) {
            dirty.insert(domain);
        }
    }
}

/// The domain whose root is the longest prefix of `path`
fn domain_of(path: &Path, roots: &[(Domain, PathBuf)]) -> Option<Domain> {
    roots
        .iter()
        .filter(|(_, root)| path.starts_with(root))
        .max_by_key(|(_, root)| root.components().count())
        .map(|(domain, _)| *domain)
}

fn reload<E: SchemaEngine>(
    registry: &SchemaRegistry<E>,
    dirty: &BTreeSet<Domain>,
    kind: LoadKind,
) -> Vec<LoadOutcome> {
    let mut outcomes = Vec::new();
    for domain in dirty {
        let Some(loader) = registry.loader(*domain) else {
            continue;
        };
        match loader.trigger(kind) {
            Some(Ok(outcome)) => outcomes.push(outcome),
            Some(Err(e)) => error!(domain = %domain, error = %e, "schema reload failed"),
            None => debug!(domain = %domain, "reload folded into the one in progress"),
        }
    }
    outcomes
}

// =============================================================================
// Scheduled Reload
// =============================================================================

/// A running periodic reloader. Dropping it stops the timer thread.
pub struct SchemaReloader {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SchemaReloader {
    /// Rebuild every configured domain each `reload.interval_ms`
    pub fn spawn<E: SchemaEngine>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
    ) -> Result<Self> {
        Self::start(registry, config, None)
    }

    /// Like [`spawn`](Self::spawn), running `callback` after each round
    pub fn spawn_with_callback<E, F>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
        callback: F,
    ) -> Result<Self>
    where
        E: SchemaEngine,
        F: Fn(&[LoadOutcome]) + Send + 'static,
    {
        Self::start(registry, config, Some(Box::new(callback)))
    }

    fn start<E: SchemaEngine>(
        registry: Arc<SchemaRegistry<E>>,
        config: &ReloadConfig,
        callback: Option<ReloadCallback>,
    ) -> Result<Self> {
        let interval = match config.interval() {
            Some(interval) if config.enabled => interval,
            _ => {
                info!("scheduled schema reload disabled");
                return Ok(Self {
                    stop: None,
                    handle: None,
                });
            }
        };

        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("schema-reloader".to_string())
            .spawn(move || reload_loop(&registry, &stopped, interval, callback.as_deref()))?;

        info!(interval_ms = interval.as_millis() as u64, "schema reloader started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the timer and wait for a round in progress to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("schema reloader thread panicked");
            }
        }
    }
}

impl Drop for SchemaReloader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reload_loop<E: SchemaEngine>(
    registry: &SchemaRegistry<E>,
    stopped: &Receiver<()>,
    interval: Duration,
    callback: Option<&(dyn Fn(&[LoadOutcome]) + Send)>,
) {
    let domains: BTreeSet<Domain> = registry.loaders().map(|loader| loader.domain()).collect();
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                debug!(domains = domains.len(), "scheduled schema reload");
                let outcomes = reload(registry, &domains, LoadKind::Full);
                if let Some(callback) = callback {
                    callback(&outcomes);
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("schema reloader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JsonEngine;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_domain_of_prefers_longest_root() {
        let roots = vec![
            (Domain::Panel, PathBuf::from("/srv/schemas")),
            (Domain::Query, PathBuf::from("/srv/schemas/queries")),
        ];
        assert_eq!(
            domain_of(Path::new("/srv/schemas/queries/prom/model.json"), &roots),
            Some(Domain::Query)
        );
        assert_eq!(
            domain_of(Path::new("/srv/schemas/text/model.json"), &roots),
            Some(Domain::Panel)
        );
        assert_eq!(domain_of(Path::new("/tmp/other.json"), &roots), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_root_matches_both_forms() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir_all(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let roots = watch_roots(Domain::Panel, &link);
        assert_eq!(roots.len(), 2);
        assert_eq!(
            domain_of(&link.join("text/model.json"), &roots),
            Some(Domain::Panel)
        );
        assert_eq!(
            domain_of(&real.canonicalize().unwrap().join("text/model.json"), &roots),
            Some(Domain::Panel)
        );
    }

    #[test]
    fn test_plain_root_is_not_duplicated() {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(watch_roots(Domain::Query, &root), vec![(Domain::Query, root.clone())]);
    }

    #[test]
    fn test_disabled_watcher_is_inactive() {
        let registry = Arc::new(SchemaRegistry::new(JsonEngine).unwrap());
        let config = ReloadConfig {
            enabled: false,
            ..ReloadConfig::default()
        };
        let watcher = SchemaWatcher::spawn(registry, &config).unwrap();
        assert!(!watcher.is_active());
    }

    #[test]
    fn test_new_plugin_folder_is_picked_up() {
        let dir = tempdir().unwrap();
        let text = dir.path().join("text");
        fs::create_dir_all(&text).unwrap();
        fs::write(text.join("model.json"), r#"{"x-package": "model", "kind": "Text"}"#).unwrap();

        let registry = Arc::new(
            SchemaRegistry::new(JsonEngine).unwrap()
                .with_domain(Domain::Panel, dir.path())
                .unwrap(),
        );
        registry.load_all().unwrap();

        let (tx, rx) = mpsc::channel();
        let config = ReloadConfig {
            enabled: true,
            debounce_ms: 50,
            ..ReloadConfig::default()
        };
        let watcher = SchemaWatcher::spawn_with_callback(Arc::clone(&registry), &config, move |outcomes| {
            let _ = tx.send(outcomes.to_vec());
        })
        .unwrap();

        let chart = dir.path().join("chart");
        fs::create_dir_all(&chart).unwrap();
        fs::write(chart.join("model.json"), r#"{"x-package": "model", "kind": "Chart"}"#).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while registry.schema(Domain::Panel, "Chart").is_none() && Instant::now() < deadline {
            let _ = rx.recv_timeout(Duration::from_millis(200));
        }
        watcher.shutdown();

        assert!(registry.schema(Domain::Panel, "Chart").is_some());
        assert!(registry.schema(Domain::Panel, "Text").is_some());
        assert!(registry.metrics().succeeded(Domain::Panel, LoadKind::Change) >= 1);
    }

    #[test]
    fn test_burst_of_writes_reloads_once() {
        let dir = tempdir().unwrap();
        let text = dir.path().join("text");
        fs::create_dir_all(&text).unwrap();
        fs::write(text.join("model.json"), r#"{"x-package": "model", "kind": "Text"}"#).unwrap();

        let registry = Arc::new(
            SchemaRegistry::new(JsonEngine)
                .unwrap()
                .with_domain(Domain::Panel, dir.path())
                .unwrap(),
        );
        registry.load_all().unwrap();

        let (tx, rx) = mpsc::channel();
        let config = ReloadConfig {
            enabled: true,
            debounce_ms: 500,
            ..ReloadConfig::default()
        };
        let watcher = SchemaWatcher::spawn_with_callback(Arc::clone(&registry), &config, move |outcomes| {
            let _ = tx.send(outcomes.to_vec());
        })
        .unwrap();

        for i in 0..5 {
            let plugin = dir.path().join(format!("chart-{}", i));
            fs::create_dir_all(&plugin).unwrap();
            fs::write(
                plugin.join("model.json"),
                format!(r#"{{"x-package": "model", "kind": "Chart{}"}}"#, i),
            )
            .unwrap();
        }

        let batch = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        watcher.shutdown();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].domain, Domain::Panel);
        assert_eq!(batch[0].kind, LoadKind::Change);
        assert_eq!(batch[0].succeeded, 6);
    }

    #[test]
    fn test_reloader_disabled_without_interval() {
        let registry = Arc::new(SchemaRegistry::new(JsonEngine).unwrap());
        let config = ReloadConfig {
            interval_ms: 0,
            ..ReloadConfig::default()
        };
        assert!(!SchemaReloader::spawn(registry, &config).unwrap().is_active());
    }

    #[test]
    fn test_reloader_rebuilds_every_domain_on_schedule() {
        let dir = tempdir().unwrap();
        for (domain, kind) in [("panels", "Text"), ("variables", "StaticList")] {
            let plugin = dir.path().join(domain).join(kind.to_lowercase());
            fs::create_dir_all(&plugin).unwrap();
            fs::write(
                plugin.join("model.json"),
                format!(r#"{{"x-package": "model", "kind": "{}"}}"#, kind),
            )
            .unwrap();
        }

        let registry = Arc::new(
            SchemaRegistry::new(JsonEngine)
                .unwrap()
                .with_domain(Domain::Panel, dir.path().join("panels"))
                .unwrap()
                .with_domain(Domain::Variable, dir.path().join("variables"))
                .unwrap(),
        );

        let (tx, rx) = mpsc::channel();
        let config = ReloadConfig {
            interval_ms: 50,
            ..ReloadConfig::default()
        };
        let reloader = SchemaReloader::spawn_with_callback(Arc::clone(&registry), &config, move |outcomes| {
            let _ = tx.send(outcomes.to_vec());
        })
        .unwrap();
        assert!(reloader.is_active());

        let first = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        reloader.shutdown();

        for round in [&first, &second] {
            let domains: Vec<_> = round.iter().map(|outcome| outcome.domain).collect();
            assert_eq!(domains, vec![Domain::Panel, Domain::Variable]);
            assert!(round.iter().all(|outcome| outcome.kind == LoadKind::Full));
        }
        assert!(registry.schema(Domain::Panel, "Text").is_some());
        assert!(registry.schema(Domain::Variable, "StaticList").is_some());
        assert!(registry.metrics().succeeded(Domain::Panel, LoadKind::Full) >= 2);
    }
}
