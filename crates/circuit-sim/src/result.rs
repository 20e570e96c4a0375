use std::collections::BTreeMap;

use circuit_core::is_ground;
use serde::{Deserialize, Serialize};

use crate::netlist::Netlist;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub source: String,
    pub values: Vec<f64>,
}

/// Magnitude and phase (degrees) over frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Phasors {
    pub magnitude: Vec<f64>,
    pub phase: Vec<f64>,
}

/// Normalized solver output. Node voltages never include the reference node;
/// branch currents are keyed by element designator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum SimulationResult {
    OperatingPoint {
        nodes: BTreeMap<String, f64>,
        branches: BTreeMap<String, f64>,
    },
    DcSweep {
        sweep: Sweep,
        nodes: BTreeMap<String, Vec<f64>>,
        branches: BTreeMap<String, Vec<f64>>,
    },
    AcSweep {
        frequency: Vec<f64>,
        nodes: BTreeMap<String, Phasors>,
        branches: BTreeMap<String, Phasors>,
    },
    Transient {
        time: Vec<f64>,
        nodes: BTreeMap<String, Vec<f64>>,
        branches: BTreeMap<String, Vec<f64>>,
    },
}

impl SimulationResult {
    /// Operating point voltage of `node`, if this is an operating point result.
    pub fn voltage(&self, node: &str) -> Option<f64> {
        match self {
            SimulationResult::OperatingPoint { nodes, .. } => nodes.get(node).copied(),
            _ => None,
        }
    }

    pub fn current(&self, designator: &str) -> Option<f64> {
        match self {
            SimulationResult::OperatingPoint { branches, .. } => branches.get(designator).copied(),
            _ => None,
        }
    }

    /// Map solver-reported names back onto the circuit's own labels. Solvers
    /// such as SPICE lowercase everything and report branches as `v1#branch`.
    pub fn normalize(self, netlist: &Netlist) -> Self {
        let node_label = |name: String| -> Option<String> {
            let bare = strip_wrapper(&name, "v");
            if is_ground(bare) {
                return None;
            }
            Some(
                netlist
                    .nodes()
                    .into_iter()
                    .find(|n| n.eq_ignore_ascii_case(bare))
                    .map(str::to_string)
                    .unwrap_or_else(|| bare.to_string()),
            )
        };
        let branch_label = |name: String| -> Option<String> {
            let bare = strip_wrapper(&name, "i");
            let bare = bare.strip_suffix("#branch").unwrap_or(bare);
            Some(
                netlist
                    .element(bare)
                    .map(|e| e.designator.clone())
                    .unwrap_or_else(|| bare.to_uppercase()),
            )
        };

        match self {
            SimulationResult::OperatingPoint { nodes, branches } => {
                SimulationResult::OperatingPoint {
                    nodes: rekey(nodes, node_label),
                    branches: rekey(branches, branch_label),
                }
            }
            SimulationResult::DcSweep {
                sweep,
                nodes,
                branches,
            } => SimulationResult::DcSweep {
                sweep: Sweep {
                    source: branch_label(sweep.source.clone()).unwrap_or(sweep.source),
                    values: sweep.values,
                },
                nodes: rekey(nodes, node_label),
                branches: rekey(branches, branch_label),
            },
            SimulationResult::AcSweep {
                frequency,
                nodes,
                branches,
            } => SimulationResult::AcSweep {
                frequency,
                nodes: rekey(nodes, node_label),
                branches: rekey(branches, branch_label),
            },
            SimulationResult::Transient {
                time,
                nodes,
                branches,
            } => SimulationResult::Transient {
                time,
                nodes: rekey(nodes, node_label),
                branches: rekey(branches, branch_label),
            },
        }
    }
}

/// `v(out)` → `out`; other names pass through.
fn strip_wrapper<'a>(name: &'a str, prefix: &str) -> &'a str {
    let name = name.trim();
    name.get(..prefix.len() + 1)
        .filter(|head| head.eq_ignore_ascii_case(&format!("{prefix}(")))
        .and_then(|_| name[prefix.len() + 1..].strip_suffix(')'))
        .unwrap_or(name)
}

fn rekey<T>(map: BTreeMap<String, T>, label: impl Fn(String) -> Option<String>) -> BTreeMap<String, T> {
    map.into_iter()
        .filter_map(|(k, v)| label(k).map(|k| (k, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use circuit_core::{templates, Circuit, CircuitId};

    #[test]
    fn test_normalize_spice_names() {
        let mut circuit = Circuit::new(CircuitId(1), "mixed case");
        for spec in &templates::voltage_divider().components {
            circuit.add_spec(spec).unwrap();
        }
        let netlist = Netlist::from_snapshot(&circuit.snapshot()).unwrap();

        let raw = SimulationResult::OperatingPoint {
            nodes: [
                ("v(in)".to_string(), 9.0),
                ("OUT".to_string(), 4.5),
                ("0".to_string(), 0.0),
            ]
            .into_iter()
            .collect(),
            branches: [("v1#branch".to_string(), -4.5e-4)].into_iter().collect(),
        };
        let result = raw.normalize(&netlist);
        assert_eq!(result.voltage("in"), Some(9.0));
        assert_eq!(result.voltage("out"), Some(4.5));
        assert_eq!(result.voltage("0"), None);
        assert_eq!(result.current("V1"), Some(-4.5e-4));
    }

    #[test]
    fn test_strip_wrapper() {
        assert_eq!(strip_wrapper("v(out)", "v"), "out");
        assert_eq!(strip_wrapper("I(V1)", "i"), "V1");
        assert_eq!(strip_wrapper("vout", "v"), "vout");
        assert_eq!(strip_wrapper("v", "v"), "v");
    }
}
