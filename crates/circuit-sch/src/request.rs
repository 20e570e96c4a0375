use std::path::PathBuf;

use circuit_core::{ComponentId, Snapshot};
use serde::Serialize;

use crate::symbol::Symbol;

/// One component as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub id: ComponentId,
    pub designator: String,
    pub symbol: Symbol,
    pub nodes: Vec<String>,
    /// Terminal name for each entry of `nodes`.
    pub pins: Vec<String>,
    /// Value caption, e.g. `10kΩ` or `2N3904`.
    pub label: String,
}

/// Everything a [`crate::Renderer`] needs; placements are in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchematicRequest {
    pub title: String,
    pub placements: Vec<Placement>,
    pub output: PathBuf,
}

pub fn schematic_request(
    snapshot: &Snapshot,
    title: Option<&str>,
    output: impl Into<PathBuf>,
) -> SchematicRequest {
    let title = title
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} (v{})", snapshot.name, snapshot.version));
    let placements = snapshot
        .components()
        .map(|c| Placement {
            id: c.id,
            designator: c.designator(),
            symbol: Symbol::for_component(c),
            nodes: c.nodes.clone(),
            pins: (0..c.nodes.len()).map(|i| c.kind.spec().pin_name(i)).collect(),
            label: c.value_label(),
        })
        .collect();
    SchematicRequest {
        title,
        placements,
        output: output.into(),
    }
}
