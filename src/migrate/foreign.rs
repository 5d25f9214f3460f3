//! Foreign dashboard model
//!
//! Only the fields migration reads are typed. Panels and variables keep the
//! rest of their JSON as `raw`, which is what migration scripts receive.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::dashboard::DefaultValue;

pub const ROW_TYPE: &str = "row";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawDashboard")]
pub struct ForeignDashboard {
    pub uid: String,
    pub title: String,
    pub panels: Vec<ForeignPanel>,
    pub variables: Vec<ForeignVariable>,
}

#[derive(Deserialize)]
struct RawDashboard {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    panels: Vec<ForeignPanel>,
    #[serde(default)]
    templating: Templating,
}

#[derive(Default, Deserialize)]
struct Templating {
    #[serde(default)]
    list: Vec<ForeignVariable>,
}

impl From<RawDashboard> for ForeignDashboard {
    fn from(raw: RawDashboard) -> Self {
        Self {
            uid: raw.uid,
            title: raw.title,
            panels: adopt_expanded_rows(raw.panels),
            variables: raw.templating.list,
        }
    }
}

/// Expanded rows are exported flat: the row is followed by its panels.
/// Move those panels back under their row so that every row owns its
/// children regardless of its collapse state.
fn adopt_expanded_rows(panels: Vec<ForeignPanel>) -> Vec<ForeignPanel> {
    let mut result = Vec::with_capacity(panels.len());
    let mut parent: Option<ForeignPanel> = None;

    for panel in panels {
        if panel.is_row() {
            if let Some(row) = parent.take() {
                result.push(row);
            }
            if panel.collapsed {
                result.push(panel);
            } else {
                parent = Some(panel);
            }
        } else if let Some(row) = parent.as_mut() {
            row.panels.push(panel);
        } else {
            result.push(panel);
        }
    }

    if let Some(row) = parent {
        result.push(row);
    }
    result
}

// =============================================================================
// Panels
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct GridPos {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    #[serde(default)]
    pub w: i64,
    #[serde(default)]
    pub h: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForeignLink {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "targetBlank")]
    pub target_blank: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ForeignPanel {
    pub panel_type: String,
    pub title: String,
    pub description: String,
    pub collapsed: bool,
    pub panels: Vec<ForeignPanel>,
    pub grid_pos: GridPos,
    pub targets: Vec<Value>,
    pub links: Vec<ForeignLink>,
    /// The panel object without `panels`, `gridPos` and `targets`
    pub raw: Value,
}

impl ForeignPanel {
    pub fn is_row(&self) -> bool {
        self.panel_type == ROW_TYPE
    }
}

impl TryFrom<Map<String, Value>> for ForeignPanel {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let panels = take_strict(&mut map, "panels")?.unwrap_or_default();
        let grid_pos = take_strict(&mut map, "gridPos")?.unwrap_or_default();
        let targets = take_strict(&mut map, "targets")?.unwrap_or_default();

        Ok(Self {
            panel_type: field(&map, "type").unwrap_or_default(),
            title: field(&map, "title").unwrap_or_default(),
            description: field(&map, "description").unwrap_or_default(),
            collapsed: field(&map, "collapsed").unwrap_or_default(),
            links: field(&map, "links").unwrap_or_default(),
            panels,
            grid_pos,
            targets,
            raw: Value::Object(map),
        })
    }
}

// =============================================================================
// Variables
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ForeignVariable {
    pub name: String,
    pub variable_type: String,
    pub description: String,
    pub label: String,
    pub hide: i64,
    pub sort: Option<i64>,
    pub include_all: bool,
    pub all_value: String,
    pub multi: bool,
    /// `current.value`, single or multiple
    pub current: Option<DefaultValue>,
    pub query: Option<Value>,
    /// The variable object without `current`
    pub raw: Value,
}

#[derive(Deserialize)]
struct Current {
    #[serde(default)]
    value: Option<DefaultValue>,
}

impl TryFrom<Map<String, Value>> for ForeignVariable {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let current = take_strict::<Current>(&mut map, "current")?.and_then(|c| c.value);

        Ok(Self {
            name: field(&map, "name").unwrap_or_default(),
            variable_type: field(&map, "type").unwrap_or_default(),
            description: field(&map, "description").unwrap_or_default(),
            label: field(&map, "label").unwrap_or_default(),
            hide: field(&map, "hide").unwrap_or_default(),
            sort: field(&map, "sort"),
            include_all: field(&map, "includeAll").unwrap_or_default(),
            all_value: field(&map, "allValue").unwrap_or_default(),
            multi: field(&map, "multi").unwrap_or_default(),
            query: map.get("query").cloned(),
            current,
            raw: Value::Object(map),
        })
    }
}

impl ForeignVariable {
    /// The text held by a `query` that is a plain string
    pub fn query_text(&self) -> Option<&str> {
        self.query.as_ref()?.as_str()
    }
}

/// A loosely typed field: a value of the wrong type reads as missing
fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    map.get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// A structural field: removed from the map, and a value of the wrong type
/// is an error
fn take_strict<T: DeserializeOwned>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, serde_json::Error> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dashboard(value: Value) -> ForeignDashboard {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_panel_raw_drops_structural_fields() {
        let panel: ForeignPanel = serde_json::from_value(json!({
            "type": "stat",
            "title": "dns",
            "gridPos": {"x": 6, "y": 12, "h": 3, "w": 2},
            "targets": [{"expr": "up"}],
            "maxDataPoints": 100,
            "links": [{"title": "Prometheus", "url": "https://prom", "targetBlank": true}]
        }))
        .unwrap();

        assert_eq!(panel.panel_type, "stat");
        assert_eq!(panel.grid_pos, GridPos { x: 6, y: 12, w: 2, h: 3 });
        assert_eq!(panel.targets.len(), 1);
        assert_eq!(panel.links[0].title, "Prometheus");
        assert!(panel.links[0].target_blank);
        assert!(panel.raw.get("gridPos").is_none());
        assert!(panel.raw.get("targets").is_none());
        assert_eq!(panel.raw["maxDataPoints"], 100);
        assert_eq!(panel.raw["links"][0]["url"], "https://prom");
    }

    #[test]
    fn test_panel_with_malformed_targets_is_rejected() {
        let result = serde_json::from_value::<ForeignPanel>(json!({"type": "stat", "targets": 3}));
        assert!(result.is_err());
    }

    #[test]
    fn test_expanded_rows_adopt_following_panels() {
        let d = dashboard(json!({
            "panels": [
                {"type": "stat", "title": "top"},
                {"type": "row", "title": "A", "collapsed": false},
                {"type": "graph", "title": "a1"},
                {"type": "graph", "title": "a2"},
                {"type": "row", "title": "B", "collapsed": true, "panels": [{"type": "text", "title": "b1"}]},
                {"type": "row", "title": "C", "collapsed": false},
                {"type": "table", "title": "c1"}
            ]
        }));

        let titles: Vec<_> = d.panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["top", "A", "B", "C"]);
        let children: Vec<_> = d.panels[1].panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(children, vec!["a1", "a2"]);
        assert_eq!(d.panels[2].panels.len(), 1);
        assert_eq!(d.panels[3].panels[0].title, "c1");
    }

    #[test]
    fn test_variable_fields() {
        let d = dashboard(json!({
            "uid": "abc",
            "title": "Demo",
            "templating": {"list": [{
                "name": "job",
                "type": "query",
                "label": "Job",
                "hide": 2,
                "sort": 3,
                "includeAll": true,
                "allValue": ".*",
                "multi": true,
                "current": {"text": ["a", "b"], "value": ["a", "b"]},
                "query": {"query": "label_values(job)"}
            }]}
        }));

        assert_eq!(d.uid, "abc");
        let v = &d.variables[0];
        assert_eq!(v.variable_type, "query");
        assert_eq!(v.sort, Some(3));
        assert_eq!(v.current, Some(DefaultValue::Multiple(vec!["a".into(), "b".into()])));
        assert!(v.query_text().is_none());
        assert!(v.raw.get("current").is_none());
        assert_eq!(v.raw["query"]["query"], "label_values(job)");
    }
}
