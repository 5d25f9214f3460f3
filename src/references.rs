//! Variable references inside plugin specs
//!
//! Plugin specs are opaque, so references such as `$env` or
//! `${cluster:csv}` are found by walking the spec tree and scanning every
//! string it contains.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::dashboard::{NativeDashboard, Variable};

/// Prefix of variables provided by the platform itself
const BUILTIN_PREFIX: &str = "__";

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{(\w+)(?:[.:][^}]*)?\}|\$(\w+)").expect("valid variable pattern")
    })
}

/// Callbacks for [`walk`]
pub trait SpecVisitor {
    fn visit_string(&mut self, value: &str);

    fn visit_key(&mut self, _key: &str) {}
}

/// Visit every object key and string of a spec, depth-first in document order
pub fn walk<V: SpecVisitor>(spec: &Value, visitor: &mut V) {
    match spec {
        Value::String(s) => visitor.visit_string(s),
        Value::Array(items) => {
            for item in items {
                walk(item, visitor);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                visitor.visit_key(key);
                walk(value, visitor);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[derive(Default)]
struct ReferenceCollector {
    names: BTreeSet<String>,
}

impl SpecVisitor for ReferenceCollector {
    fn visit_string(&mut self, value: &str) {
        for captures in reference_pattern().captures_iter(value) {
            let Some(name) = captures.get(1).or_else(|| captures.get(2)) else {
                continue;
            };
            let name = name.as_str();
            if name.starts_with(BUILTIN_PREFIX) || name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            self.names.insert(name.to_string());
        }
    }
}

/// Names of the dashboard variables a spec refers to, sorted
pub fn collect_variable_references(spec: &Value) -> Vec<String> {
    let mut collector = ReferenceCollector::default();
    walk(spec, &mut collector);
    collector.names.into_iter().collect()
}

/// Variables referenced by panel or query plugins that the dashboard does
/// not define, sorted
pub fn undefined_variables(dashboard: &NativeDashboard) -> Vec<String> {
    let defined: BTreeSet<&str> = dashboard.spec.variables.iter().map(Variable::name).collect();

    let mut collector = ReferenceCollector::default();
    for panel in dashboard.spec.panels.values() {
        walk(&panel.spec.plugin.spec, &mut collector);
        for query in &panel.spec.queries {
            walk(&query.spec.plugin.spec, &mut collector);
        }
    }

    collector
        .names
        .into_iter()
        .filter(|name| !defined.contains(name.as_str()))
        .collect()
}
