//! Plugin Schemas CLI
//!
//! Developer tool over a schema tree: load and report, validate plugins or
//! dashboards, decode a kind, migrate a foreign dashboard, watch for changes.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use plugin_schemas::decoder::SchemaTreeDecoder;
use plugin_schemas::payload::{build_default_payload, build_payload_with_proxy, HttpProxyConfig};
use plugin_schemas::{
    Domain, JsonEngine, LoadOutcome, MigrationEngine, NativeDashboard, PluginDescriptor,
    SchemaConfig, SchemaRegistry, SchemaReloader, SchemaValidator, SchemaWatcher,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plugin-schemas")]
#[command(about = "Load, validate, decode and migrate with plugin schemas")]
struct Cli {
    /// Configuration file (defaults to plugin-schemas.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Schema root holding panels/, queries/, datasources/ and variables/;
    /// overrides the configured paths
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every domain and report what was accepted
    Check,

    /// Validate a plugin (with --domain) or a whole dashboard
    Validate {
        /// JSON file to validate
        file: PathBuf,
        /// Validate a single plugin of this domain
        #[arg(short, long)]
        domain: Option<Domain>,
    },

    /// Print the decoded tree and default payload of a kind
    Decode {
        #[arg(short, long)]
        domain: Domain,
        kind: String,
        /// Inject this URL wherever the schema declares an HTTP proxy
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Migrate a foreign dashboard
    Migrate {
        file: PathBuf,
        /// Input substitution, `name=value`
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, String)>,
        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load every domain and print the load counters in Prometheus text format
    Metrics,

    /// Load, then reload on every change and on schedule until interrupted
    Watch,

    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "plugin-schemas.toml")]
        output: String,
    },
}

fn parse_input(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { output } = &cli.command {
        SchemaConfig::default().save(output)?;
        println!("✅ Created config file: {}", output);
        return Ok(());
    }

    let mut config = SchemaConfig::load_from(cli.config.as_deref())?;
    if let Some(root) = &cli.schemas {
        config.schemas = plugin_schemas::config::SchemasConfig::from_root(root);
    }

    let registry = Arc::new(SchemaRegistry::from_config(JsonEngine, &config)?);
    if !matches!(cli.command, Commands::Migrate { .. }) {
        let outcomes = registry.load_all()?;
        match cli.command {
            Commands::Check => return report(&outcomes, &registry),
            Commands::Metrics => {
                print!("{}", registry.metrics().encode_text()?);
                return Ok(());
            }
            _ => {}
        }
    }

    match cli.command {
        Commands::Check | Commands::Metrics | Commands::Init { .. } => Ok(()),

        Commands::Validate { file, domain } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let validator = SchemaValidator::new(Arc::clone(&registry));
            match domain {
                Some(domain) => {
                    let plugin: PluginDescriptor = serde_json::from_str(&raw)?;
                    validator.validate(&plugin, domain)?;
                    println!("✅ {} plugin {:?} is valid", domain, plugin.kind);
                }
                None => {
                    let dashboard: NativeDashboard = serde_json::from_str(&raw)?;
                    validator.validate_dashboard(&dashboard)?;
                    println!("✅ dashboard {:?} is valid", dashboard.metadata.name);
                }
            }
            Ok(())
        }

        Commands::Decode {
            domain,
            kind,
            proxy,
        } => {
            let schema = registry
                .schema(domain, &kind)
                .ok_or_else(|| anyhow!("no {} schema registered for kind {:?}", domain, kind))?;
            let nodes = SchemaTreeDecoder::new(registry.engine()).decode(&schema.value)?;
            let payload = match proxy {
                Some(url) => build_payload_with_proxy(&nodes, &HttpProxyConfig::new(url))?,
                None => build_default_payload(&nodes)?,
            };
            println!("{}", serde_json::to_string_pretty(&nodes)?);
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }

        Commands::Migrate {
            file,
            inputs,
            output,
        } => {
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let engine = MigrationEngine::from_registry(&registry, config.migration.clone())?;
            let inputs: BTreeMap<String, String> = inputs.into_iter().collect();
            let dashboard = engine.migrate_raw(&bytes, &inputs)?;
            let json = serde_json::to_string_pretty(&dashboard)?;
            match output {
                Some(path) => {
                    fs::write(&path, json)?;
                    println!("✅ Migrated dashboard written to {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Watch => {
            if !config.reload.enabled {
                bail!("hot reload is disabled in the configuration");
            }
            let print_outcomes = |outcomes: &[LoadOutcome]| {
                for outcome in outcomes {
                    print_outcome(outcome);
                }
            };
            let _watcher =
                SchemaWatcher::spawn_with_callback(Arc::clone(&registry), &config.reload, print_outcomes)?;
            let _reloader =
                SchemaReloader::spawn_with_callback(Arc::clone(&registry), &config.reload, print_outcomes)?;
            println!("👀 Watching schema directories, press Ctrl-C to stop");
            loop {
                std::thread::park();
            }
        }
    }
}

fn report(outcomes: &[LoadOutcome], registry: &SchemaRegistry) -> anyhow::Result<()> {
    println!("🔍 Loading schemas...");
    for outcome in outcomes {
        print_outcome(outcome);
        if let Some(snapshot) = registry.snapshot(outcome.domain) {
            println!(
                "   digest {} built {}",
                snapshot.digest().short(),
                snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S")
            );
            for kind in snapshot.kinds() {
                println!("    • {}", kind);
            }
        }
    }

    println!("\n📊 Load counters:");
    for counter in registry.metrics().report() {
        println!(
            "   {} ({}): {} succeeded, {} failed",
            counter.domain, counter.kind, counter.succeeded, counter.failed
        );
    }

    let failed: usize = outcomes.iter().map(LoadOutcome::failed).sum();
    println!();
    if failed > 0 {
        bail!("{} schema(s) failed to load", failed);
    }
    println!("✅ All schemas loaded");
    Ok(())
}

fn print_outcome(outcome: &LoadOutcome) {
    let mark = if outcome.failures.is_empty() { "✅" } else { "⚠️ " };
    println!(
        "{} {} ({}): {} loaded, {} failed{}",
        mark,
        outcome.domain,
        outcome.kind,
        outcome.succeeded,
        outcome.failed(),
        if outcome.published { "" } else { ", previous snapshot kept" }
    );
    for (path, failure) in &outcome.failures {
        println!("   └─ {}: {}", path.display(), failure);
    }
}
