//! Panels and their queries

use std::collections::BTreeMap;

use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use super::foreign::{ForeignDashboard, ForeignLink, ForeignPanel};
use super::{MigrationEngine, Scope};
use crate::dashboard::{Display, Link, Panel, PanelKey, Query, QuerySpec};
use crate::engine::SchemaEngine;
use crate::error::{Result, SchemaError};
use crate::plugin::PluginDescriptor;

pub const MARKDOWN_KIND: &str = "Markdown";
pub const UNSUPPORTED_PANEL_TEXT: &str = "**Migration not supported!**";

/// Display name of a panel without title
const UNTITLED_PANEL: &str = "empty";

fn markdown(text: impl Into<String>) -> PluginDescriptor {
    PluginDescriptor::new(MARKDOWN_KIND, json!({ "text": text.into() }))
}

impl<E: SchemaEngine> MigrationEngine<E> {
    /// Every leaf panel, keyed the way layouts reference it
    pub(super) fn migrate_panels(
        &self,
        foreign: &ForeignDashboard,
    ) -> Result<BTreeMap<PanelKey, Panel>> {
        let mut panels = BTreeMap::new();

        for (i, panel) in foreign.panels.iter().enumerate() {
            if panel.is_row() {
                for (j, child) in panel.panels.iter().enumerate() {
                    let key = PanelKey::row_child(i, j);
                    let migrated = self.migrate_panel(&key, child)?;
                    panels.insert(key, migrated);
                }
            } else {
                let key = PanelKey::top_level(i);
                let migrated = self.migrate_panel(&key, panel)?;
                panels.insert(key, migrated);
            }
        }

        Ok(panels)
    }

    fn migrate_panel(&self, key: &PanelKey, foreign: &ForeignPanel) -> Result<Panel> {
        let display = Display {
            name: if foreign.title.is_empty() {
                UNTITLED_PANEL.to_string()
            } else {
                foreign.title.clone()
            },
            description: Some(foreign.description.clone()).filter(|d| !d.is_empty()),
        };
        let mut panel = Panel::new(display, markdown(UNSUPPORTED_PANEL_TEXT));
        panel.spec.links = foreign.links.iter().map(convert_link).collect();

        let Some(script) = self.scripts.panel(&foreign.panel_type) else {
            debug!(panel = %key, foreign_type = %foreign.panel_type, "no migration script for panel type");
            return Ok(panel);
        };

        match self.execute_script(&script.value, Scope::Panel, &foreign.raw) {
            Ok(Some(plugin)) => panel.spec.plugin = plugin,
            Ok(None) => {
                debug!(panel = %key, foreign_type = %foreign.panel_type, "panel script does not apply")
            }
            Err(e) => {
                let failure = SchemaError::MigrationBadInput {
                    element: "panel".to_string(),
                    foreign_type: foreign.panel_type.clone(),
                    reason: e.to_string(),
                };
                if !self.config.isolate_panel_failures {
                    return Err(failure.in_element(format!("panel {}", key)));
                }
                warn!(panel = %key, error = %failure, "panel replaced by a placeholder");
                panel.spec.plugin = markdown(format!(
                    "unable to convert foreign panel of type {:?}",
                    foreign.panel_type
                ));
            }
        }

        panel.spec.queries = foreign
            .targets
            .iter()
            .filter_map(|target| self.migrate_query(key, target))
            .collect();
        Ok(panel)
    }

    /// First query script that yields a plugin wins; a target no script
    /// converts is dropped.
    fn migrate_query(&self, key: &PanelKey, target: &Json) -> Option<Query> {
        for query in self.scripts.queries() {
            match self.execute_script(&query.script.value, Scope::Query, target) {
                Ok(Some(plugin)) => {
                    return Some(Query {
                        kind: query.query_kind.clone(),
                        spec: QuerySpec { plugin },
                    })
                }
                Ok(None) => {}
                Err(e) => debug!(
                    panel = %key,
                    script = %query.script.source.display(),
                    error = %e,
                    "query script does not apply"
                ),
            }
        }

        debug!(panel = %key, "no query script converts target, dropping it");
        None
    }
}

fn convert_link(link: &ForeignLink) -> Link {
    Link {
        name: Some(link.title.clone()).filter(|t| !t.is_empty()),
        url: link.url.clone(),
        target_blank: link.target_blank,
        render_variables: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_link() {
        let link = convert_link(&ForeignLink {
            title: "Runbook".into(),
            url: "https://runbooks/dns".into(),
            target_blank: true,
        });
        assert_eq!(link.name.as_deref(), Some("Runbook"));
        assert!(link.target_blank);
        assert!(link.render_variables);

        let untitled = convert_link(&ForeignLink::default());
        assert!(untitled.name.is_none());
    }
}
