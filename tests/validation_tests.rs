//! Validation Tests
//!
//! Plugin and whole-dashboard validation against the fixture schema tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use plugin_schemas::config::{MigrationConfig, SchemaConfig, SchemasConfig};
use plugin_schemas::dashboard::PanelKey;
use plugin_schemas::engine::EngineError;
use plugin_schemas::plugin::PluginMetadata;
use plugin_schemas::{
    Domain, JsonEngine, MigrationEngine, NativeDashboard, PluginDescriptor, SchemaError,
    SchemaRegistry, SchemaValidator,
};
use serde_json::json;

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn registry() -> Arc<SchemaRegistry> {
    let mut config = SchemaConfig::default();
    config.schemas = SchemasConfig::from_root(fixtures_path().join("schemas"));
    let registry = SchemaRegistry::from_config(JsonEngine, &config).unwrap();
    registry.load_all().unwrap();
    Arc::new(registry)
}

fn validator() -> SchemaValidator<JsonEngine> {
    SchemaValidator::new(registry())
}

fn engine_error(err: &SchemaError) -> &EngineError {
    match err.root_cause() {
        SchemaError::Validation { source, .. } => source,
        other => panic!("expected validation error, got {:?}", other),
    }
}

fn migrated(name: &str) -> NativeDashboard {
    let registry = registry();
    let engine = MigrationEngine::from_registry(&registry, MigrationConfig::default()).unwrap();
    let bytes = fs::read(fixtures_path().join("dashboards").join(name)).unwrap();
    engine.migrate_raw(&bytes, &Default::default()).unwrap()
}

// =============================================================================
// Plugins
// =============================================================================

#[test]
fn test_valid_plugin() {
    let plugin = PluginDescriptor::new("StatChart", json!({"calculation": "last"}));
    validator().validate(&plugin, Domain::Panel).unwrap();
}

#[test]
fn test_optional_fields_accept_data() {
    let plugin = PluginDescriptor::new(
        "StatChart",
        json!({"calculation": "mean", "format": {"unit": "bytes", "decimalPlaces": 2}, "sparkline": {"color": "red"}}),
    );
    validator().validate(&plugin, Domain::Panel).unwrap();
}

#[test]
fn test_missing_required_field() {
    let plugin = PluginDescriptor::new("StatChart", json!({}));
    let err = validator().validate(&plugin, Domain::Panel).unwrap_err();

    let source = engine_error(&err);
    assert!(source.is_incomplete());
    assert_eq!(source.path(), Some("spec.calculation"));
    assert!(err.to_string().contains("spec.calculation"));
}

#[test]
fn test_unknown_field_is_rejected() {
    let plugin = PluginDescriptor::new("StatChart", json!({"calculation": "last", "color": "red"}));
    let err = validator().validate(&plugin, Domain::Panel).unwrap_err();

    match engine_error(&err) {
        EngineError::FieldNotAllowed { path } => assert_eq!(path, "spec.color"),
        other => panic!("expected field not allowed, got {:?}", other),
    }
}

#[test]
fn test_wrong_scalar_type() {
    let plugin = PluginDescriptor::new("StatChart", json!({"calculation": 3}));
    let err = validator().validate(&plugin, Domain::Panel).unwrap_err();
    assert_eq!(engine_error(&err).path(), Some("spec.calculation"));
}

#[test]
fn test_pattern_and_alternatives_are_enforced() {
    let validator = validator();

    let ok = PluginDescriptor::new(
        "TimeSeriesChart",
        json!({"visual": {"display": "bar"}, "legend": {"position": "right", "mode": "table"}}),
    );
    validator.validate(&ok, Domain::Panel).unwrap();

    let bad_mode = PluginDescriptor::new(
        "TimeSeriesChart",
        json!({"visual": {"display": "bar"}, "legend": {"position": "right", "mode": "grid"}}),
    );
    let err = validator.validate(&bad_mode, Domain::Panel).unwrap_err();
    assert_eq!(engine_error(&err).path(), Some("spec.legend.mode"));

    let bad_display = PluginDescriptor::new("TimeSeriesChart", json!({"visual": {"display": "pie"}}));
    assert!(validator.validate(&bad_display, Domain::Panel).is_err());
}

#[test]
fn test_unknown_kind_suggests_closest() {
    let plugin = PluginDescriptor::new("TimeSeriesChrt", json!({}));
    let err = validator().validate(&plugin, Domain::Panel).unwrap_err();

    match err {
        SchemaError::UnknownKind {
            domain,
            kind,
            suggestion,
        } => {
            assert_eq!(domain, Domain::Panel);
            assert_eq!(kind, "TimeSeriesChrt");
            assert_eq!(suggestion.as_deref(), Some("TimeSeriesChart"));
        }
        other => panic!("expected unknown kind, got {:?}", other),
    }
}

#[test]
fn test_kind_of_another_domain_is_unknown() {
    let plugin = PluginDescriptor::new("PrometheusTimeSeriesQuery", json!({"query": "up"}));
    let err = validator().validate(&plugin, Domain::Panel).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownKind { .. }));

    validator().validate(&plugin, Domain::Query).unwrap();
}

#[test]
fn test_declared_version_must_match() {
    let validator = validator();
    let mut plugin = PluginDescriptor::new("Markdown", json!({"text": "hi"}));

    plugin.metadata = Some(PluginMetadata {
        version: Some("0.3.0".to_string()),
        registry: None,
    });
    validator.validate(&plugin, Domain::Panel).unwrap();

    plugin.metadata = Some(PluginMetadata {
        version: Some("0.2.0".to_string()),
        registry: None,
    });
    match validator.validate(&plugin, Domain::Panel).unwrap_err() {
        SchemaError::VersionMismatch {
            kind,
            expected,
            found,
        } => {
            assert_eq!(kind, "Markdown");
            assert_eq!(expected, "0.3.0");
            assert_eq!(found, "0.2.0");
        }
        other => panic!("expected version mismatch, got {:?}", other),
    }
}

#[test]
fn test_unconfigured_domain_is_accepted() {
    let registry = SchemaRegistry::new(JsonEngine).unwrap()
        .with_domain(Domain::Panel, fixtures_path().join("schemas/panels"))
        .unwrap();
    registry.load_all().unwrap();
    let validator = SchemaValidator::new(Arc::new(registry));

    let plugin = PluginDescriptor::new("Anything", json!({"free": "form"}));
    validator.validate(&plugin, Domain::Query).unwrap();
}

// =============================================================================
// Dashboards
// =============================================================================

#[test]
fn test_migrated_dashboards_validate() {
    let validator = validator();
    for name in ["basic.json", "rows.json"] {
        let dashboard = migrated(name);
        validator.validate_dashboard(&dashboard).unwrap();
    }
}

#[test]
fn test_dashboard_error_names_the_query() {
    let mut dashboard = migrated("basic.json");
    let panel = dashboard.spec.panels.values_mut().nth(1).unwrap();
    panel.spec.queries[0].spec.plugin.spec = json!({});

    let err = validator().validate_dashboard(&dashboard).unwrap_err();
    match &err {
        SchemaError::Element { name, .. } => assert_eq!(name, "panel 1 query n°1"),
        other => panic!("expected element error, got {:?}", other),
    }
    assert!(err.to_string().starts_with("panel 1 query n°1: "));
}

#[test]
fn test_dashboard_panels_come_before_variables() {
    let mut dashboard = migrated("basic.json");
    dashboard.spec.panels.values_mut().nth(2).unwrap().spec.plugin.kind = "Pie".to_string();
    for variable in &mut dashboard.spec.variables {
        if let plugin_schemas::dashboard::Variable::ListVariable(list) = variable {
            list.plugin.spec = json!({"bogus": true});
        }
    }

    let err = validator().validate_dashboard(&dashboard).unwrap_err();
    match &err {
        SchemaError::Element { name, source } => {
            assert_eq!(name, "panel 2");
            assert!(matches!(**source, SchemaError::UnknownKind { .. }));
        }
        other => panic!("expected element error, got {:?}", other),
    }
}

#[test]
fn test_dashboard_panels_are_checked_in_document_order() {
    let mut dashboard = migrated("basic.json");
    let mut late = dashboard.spec.panels.values().next().unwrap().clone();
    late.spec.plugin.kind = "Pie".to_string();
    dashboard.spec.panels.insert(PanelKey::top_level(10), late);
    dashboard.spec.panels.values_mut().nth(2).unwrap().spec.plugin.kind = "Gauge".to_string();

    let err = validator().validate_dashboard(&dashboard).unwrap_err();
    match &err {
        SchemaError::Element { name, source } => {
            assert_eq!(name, "panel 2");
            match source.as_ref() {
                SchemaError::UnknownKind { kind, .. } => assert_eq!(kind, "Gauge"),
                other => panic!("expected unknown kind, got {:?}", other),
            }
        }
        other => panic!("expected element error, got {:?}", other),
    }
}

#[test]
fn test_dashboard_variable_error() {
    let mut dashboard = migrated("basic.json");
    for variable in &mut dashboard.spec.variables {
        if let plugin_schemas::dashboard::Variable::ListVariable(list) = variable {
            if list.name == "job" {
                list.plugin.spec = json!({});
            }
        }
    }

    let err = validator().validate_dashboard(&dashboard).unwrap_err();
    match &err {
        SchemaError::Element { name, .. } => assert_eq!(name, "variable job"),
        other => panic!("expected element error, got {:?}", other),
    }
    assert_eq!(engine_error(&err).path(), Some("spec.labelName"));
}
