//! Schema Validator
//!
//! Validates plugin descriptors against the current registry snapshot with
//! closed-field, fully-concrete semantics.

use std::sync::Arc;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::{debug, warn};

use crate::dashboard::{NativeDashboard, Variable};
use crate::domain::Domain;
use crate::engine::SchemaEngine;
use crate::error::{Result, SchemaError};
use crate::plugin::PluginDescriptor;
use crate::registry::SchemaRegistry;

/// Validates plugins and whole dashboards
pub struct SchemaValidator<E: SchemaEngine> {
    registry: Arc<SchemaRegistry<E>>,
}

impl<E: SchemaEngine> SchemaValidator<E> {
    pub fn new(registry: Arc<SchemaRegistry<E>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry<E> {
        &self.registry
    }

    /// Validate one plugin of a domain.
    ///
    /// Plugins of a domain with no configured schema directory are accepted
    /// without checks.
    pub fn validate(&self, plugin: &PluginDescriptor, domain: Domain) -> Result<()> {
        let Some(snapshot) = self.registry.snapshot(domain) else {
            warn!(domain = %domain, kind = %plugin.kind, "no schemas configured for domain, skipping validation");
            return Ok(());
        };

        let schema = snapshot
            .get(&plugin.kind)
            .ok_or_else(|| SchemaError::UnknownKind {
                domain,
                kind: plugin.kind.clone(),
                suggestion: suggest(&plugin.kind, snapshot.kinds()),
            })?;

        if let (Some(declared), Some(expected)) = (plugin.version(), &schema.version) {
            let found = semver::Version::parse(declared)
                .map_err(|e| SchemaError::InvalidVersion(format!("{}: {}", declared, e)))?;
            if &found != expected {
                return Err(SchemaError::VersionMismatch {
                    kind: plugin.kind.clone(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }

        let engine = self.registry.engine();
        let invalid = |source| SchemaError::Validation {
            domain,
            kind: plugin.kind.clone(),
            source,
        };

        let data = engine.from_json(&plugin.to_unification_input());
        let unified = engine.unify(&schema.value, &data).map_err(invalid)?;
        engine.validate_concrete(&unified).map_err(invalid)?;

        debug!(domain = %domain, kind = %plugin.kind, "plugin is valid");
        Ok(())
    }

    /// Validate every plugin of a dashboard: panels in document order, then the
    /// queries of each panel, then list variables. The first failure is
    /// returned, attributed to its element.
    pub fn validate_dashboard(&self, dashboard: &NativeDashboard) -> Result<()> {
        for (key, panel) in &dashboard.spec.panels {
            self.validate(&panel.spec.plugin, Domain::Panel)
                .map_err(|e| e.in_element(format!("panel {}", key)))?;

            for (i, query) in panel.spec.queries.iter().enumerate() {
                self.validate(&query.spec.plugin, Domain::Query)
                    .map_err(|e| e.in_element(format!("panel {} query n°{}", key, i + 1)))?;
            }
        }

        for variable in &dashboard.spec.variables {
            if let Variable::ListVariable(list) = variable {
                self.validate(&list.plugin, Domain::Variable)
                    .map_err(|e| e.in_element(format!("variable {}", list.name)))?;
            }
        }

        Ok(())
    }
}

/// Closest registered kind, if any scores at all
fn suggest<'a>(kind: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let matcher = SkimMatcherV2::default().ignore_case();
    candidates
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(candidate, kind)
                .or_else(|| matcher.fuzzy_match(kind, candidate))
                .map(|score| (score, candidate))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggest_closest_kind() {
        let kinds = ["Markdown", "TimeSeriesChart", "StatChart"];
        assert_eq!(
            suggest("TimeSeriesChrt", kinds.into_iter()).as_deref(),
            Some("TimeSeriesChart")
        );
        assert_eq!(suggest("zzz", kinds.into_iter()), None);
    }
}
