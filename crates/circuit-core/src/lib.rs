//! Core circuit model: the component registry, circuits with their version
//! history, and the directory that hands circuits out by id.

pub mod config;
pub mod directory;
pub mod error;
pub mod model;
pub mod registry;
pub mod templates;

pub use directory::{lock_circuit, CircuitDirectory, CircuitHandle, CircuitSummary};
pub use error::{CircuitError, Result};
pub use model::{
    format_si, Change, Circuit, CircuitId, CircuitState, Component, ComponentId, ComponentMap,
    ComponentSpec, ComponentValue, ParamValue, Parameters, Revision, Snapshot,
};
pub use registry::{ComponentKind, KindSpec, Terminals, ValueShape};

/// Node labels treated as the reference node. `"0"` is canonical; the others
/// are accepted spellings that netlists rewrite to `"0"`.
pub const GROUND_ALIASES: [&str; 3] = ["0", "gnd", "ground"];

pub fn is_ground(node: &str) -> bool {
    GROUND_ALIASES
        .iter()
        .any(|alias| node.eq_ignore_ascii_case(alias))
}
