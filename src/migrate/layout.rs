//! Grid layouts
//!
//! Layout items address panels with the same [`PanelKey`] the panels map
//! uses.

use super::foreign::{ForeignPanel, GridPos};
use crate::dashboard::{GridCollapse, GridDisplay, GridItem, GridLayoutSpec, Layout, PanelKey};

/// One untitled group for the top-level panels (only when there are some),
/// then one group per row in document order.
pub(super) fn build_layouts(panels: &[ForeignPanel]) -> Vec<Layout> {
    let mut layouts = Vec::new();

    let top_level: Vec<GridItem> = panels
        .iter()
        .enumerate()
        .filter(|(_, panel)| !panel.is_row())
        .map(|(i, panel)| grid_item(PanelKey::top_level(i), &panel.grid_pos))
        .collect();
    if !top_level.is_empty() {
        layouts.push(Layout::Grid(GridLayoutSpec {
            display: None,
            items: top_level,
        }));
    }

    for (i, row) in panels.iter().enumerate().filter(|(_, panel)| panel.is_row()) {
        let items = row
            .panels
            .iter()
            .enumerate()
            .map(|(j, child)| grid_item(PanelKey::row_child(i, j), &child.grid_pos))
            .collect();
        layouts.push(Layout::Grid(GridLayoutSpec {
            display: Some(GridDisplay {
                title: row.title.clone(),
                collapse: Some(GridCollapse {
                    open: !row.collapsed,
                }),
            }),
            items,
        }));
    }

    layouts
}

fn grid_item(key: PanelKey, pos: &GridPos) -> GridItem {
    GridItem {
        x: pos.x,
        y: pos.y,
        width: pos.w,
        height: pos.h,
        content: key.reference(),
    }
}
