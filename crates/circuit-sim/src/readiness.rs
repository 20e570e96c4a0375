use std::collections::BTreeMap;

use circuit_core::{is_ground, Snapshot};

use crate::error::Underconstrained;

/// Check that a circuit is worth handing to a solver: it has components, a
/// reference node, at least one independent source, and no node that only a
/// single terminal touches. Solvers tend to crash or hang on such circuits, so
/// this runs before any solver invocation.
pub fn check_ready(snapshot: &Snapshot) -> Result<(), Underconstrained> {
    if snapshot.is_empty() {
        return Err(Underconstrained::Empty);
    }
    if !snapshot.components().any(|c| c.kind.is_source()) {
        return Err(Underconstrained::NoSource);
    }

    let mut terminals: BTreeMap<&str, usize> = BTreeMap::new();
    for node in snapshot.components().flat_map(|c| c.nodes.iter()) {
        *terminals.entry(node.as_str()).or_default() += 1;
    }
    if !terminals.keys().any(|n| is_ground(n)) {
        return Err(Underconstrained::NoGround);
    }

    let dangling: Vec<String> = terminals
        .iter()
        .filter(|(node, count)| !is_ground(node) && **count < 2)
        .map(|(node, _)| node.to_string())
        .collect();
    if !dangling.is_empty() {
        return Err(Underconstrained::DanglingNodes(dangling));
    }
    Ok(())
}
