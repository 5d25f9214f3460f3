//! Native dashboard model
//!
//! The output of migration and the input of whole-dashboard validation.
//! Panels live in a map keyed by [`PanelKey`]; layout items point into that
//! map through the same key.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plugin::PluginDescriptor;

pub const DASHBOARD_KIND: &str = "Dashboard";
pub const PANEL_KIND: &str = "Panel";
pub const DEFAULT_QUERY_KIND: &str = "TimeSeriesQuery";

/// Key of a panel in [`DashboardSpec::panels`]. Keys order by their
/// `_`-separated segments, numerically where a segment is an index, so
/// `"2"` precedes `"10"` and panel maps iterate in document order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelKey(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeySegment<'a> {
    Index(u64),
    Name(&'a str),
}

impl PanelKey {
    fn segments(&self) -> impl Iterator<Item = KeySegment<'_>> {
        self.0.split('_').map(|segment| match segment.parse() {
            Ok(index) => KeySegment::Index(index),
            Err(_) => KeySegment::Name(segment),
        })
    }
}

impl Ord for PanelKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments()
            .cmp(other.segments())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PanelKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PanelKey {
    /// A top-level panel: `"{index}"`
    pub fn top_level(index: usize) -> Self {
        Self(index.to_string())
    }

    /// A panel inside a row: `"{row}_{child}"`
    pub fn row_child(row: usize, child: usize) -> Self {
        Self(format!("{}_{}", row, child))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Structural reference used by layout items
    pub fn reference(&self) -> PanelRef {
        PanelRef {
            reference: format!("#/spec/panels/{}", self.0),
        }
    }
}

impl fmt::Display for PanelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeDashboard {
    pub kind: String,
    pub metadata: DashboardMetadata,
    pub spec: DashboardSpec,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardMetadata {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub display: Display,
    pub duration: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub panels: BTreeMap<PanelKey, Panel>,
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Display {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// Panels
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub kind: String,
    pub spec: PanelSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    pub display: Display,
    pub plugin: PluginDescriptor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<Query>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub kind: String,
    pub spec: QuerySpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub plugin: PluginDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default)]
    pub target_blank: bool,
    #[serde(default)]
    pub render_variables: bool,
}

impl Panel {
    pub fn new(display: Display, plugin: PluginDescriptor) -> Self {
        Self {
            kind: PANEL_KIND.to_string(),
            spec: PanelSpec {
                display,
                plugin,
                queries: Vec::new(),
                links: Vec::new(),
            },
        }
    }
}

// =============================================================================
// Layouts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum Layout {
    Grid(GridLayoutSpec),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GridLayoutSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<GridDisplay>,
    pub items: Vec<GridItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDisplay {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse: Option<GridCollapse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCollapse {
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridItem {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub content: PanelRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRef {
    #[serde(rename = "$ref")]
    pub reference: String,
}

impl Layout {
    pub fn items(&self) -> &[GridItem] {
        match self {
            Layout::Grid(grid) => &grid.items,
        }
    }
}

// =============================================================================
// Variables
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum Variable {
    TextVariable(TextVariableSpec),
    ListVariable(ListVariableSpec),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::TextVariable(spec) => &spec.name,
            Variable::ListVariable(spec) => &spec.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextVariableSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<VariableDisplay>,
    pub value: String,
    #[serde(default)]
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVariableSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<VariableDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
    #[serde(default)]
    pub allow_all_value: bool,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_all_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    pub plugin: PluginDescriptor,
}

/// A variable default that keeps the single/multiple shape of its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sort {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "alphabetical-asc")]
    AlphabeticalAsc,
    #[serde(rename = "alphabetical-desc")]
    AlphabeticalDesc,
    #[serde(rename = "numerical-asc")]
    NumericalAsc,
    #[serde(rename = "numerical-desc")]
    NumericalDesc,
    #[serde(rename = "alphabetical-ci-asc")]
    AlphabeticalCiAsc,
    #[serde(rename = "alphabetical-ci-desc")]
    AlphabeticalCiDesc,
}

impl Sort {
    /// Ordinal table of the foreign sort enum
    const BY_ORDINAL: [Sort; 7] = [
        Sort::None,
        Sort::AlphabeticalAsc,
        Sort::AlphabeticalDesc,
        Sort::NumericalAsc,
        Sort::NumericalDesc,
        Sort::AlphabeticalCiAsc,
        Sort::AlphabeticalCiDesc,
    ];

    /// Out-of-range ordinals mean no explicit sort
    pub fn from_ordinal(ordinal: i64) -> Option<Sort> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| Self::BY_ORDINAL.get(i).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_panel_keys_sort_in_document_order() {
        let mut keys: Vec<PanelKey> = ["10", "2", "1_10", "1_2", "0", "custom"]
            .into_iter()
            .map(|k| PanelKey(k.to_string()))
            .collect();
        keys.sort();
        let sorted: Vec<_> = keys.iter().map(PanelKey::as_str).collect();
        assert_eq!(sorted, vec!["0", "1_2", "1_10", "2", "10", "custom"]);
    }

    #[test]
    fn test_panel_key_reference() {
        assert_eq!(PanelKey::top_level(3).as_str(), "3");
        assert_eq!(
            PanelKey::row_child(0, 2).reference().reference,
            "#/spec/panels/0_2"
        );
    }

    #[test]
    fn test_sort_ordinals() {
        assert_eq!(Sort::from_ordinal(0), Some(Sort::None));
        assert_eq!(Sort::from_ordinal(6), Some(Sort::AlphabeticalCiDesc));
        assert_eq!(Sort::from_ordinal(7), None);
        assert_eq!(Sort::from_ordinal(-1), None);
    }

    #[test]
    fn test_variable_serialization() {
        let variable = Variable::TextVariable(TextVariableSpec {
            name: "env".into(),
            display: None,
            value: "prod".into(),
            constant: true,
        });
        assert_eq!(
            serde_json::to_value(&variable).unwrap(),
            json!({"kind": "TextVariable", "spec": {"name": "env", "value": "prod", "constant": true}})
        );
    }

    #[test]
    fn test_default_value_keeps_shape() {
        let single: DefaultValue = serde_json::from_value(json!("a")).unwrap();
        let multiple: DefaultValue = serde_json::from_value(json!(["a"])).unwrap();
        assert_eq!(single, DefaultValue::Single("a".into()));
        assert_eq!(multiple, DefaultValue::Multiple(vec!["a".into()]));
    }

    #[test]
    fn test_layout_serialization() {
        let layout = Layout::Grid(GridLayoutSpec {
            display: Some(GridDisplay {
                title: "Group A".into(),
                collapse: Some(GridCollapse { open: false }),
            }),
            items: vec![GridItem {
                x: 0,
                y: 1,
                width: 12,
                height: 6,
                content: PanelKey::row_child(0, 0).reference(),
            }],
        });
        let value = serde_json::to_value(&layout).unwrap();
        assert_eq!(value["kind"], "Grid");
        assert_eq!(value["spec"]["items"][0]["content"]["$ref"], "#/spec/panels/0_0");
        assert_eq!(value["spec"]["display"]["collapse"]["open"], false);
    }
}
