use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use log::debug;

use super::Solver;
use crate::analysis::AnalysisRequest;
use crate::netlist::{Element, Netlist, Source};
use crate::result::{SimulationResult, Sweep};

/// Conductance from every node to ground, so nodes reached only through
/// capacitors still have a defined voltage.
const GMIN: f64 = 1e-12;
const PIVOT_EPSILON: f64 = 1e-18;
/// Input resistance placed across opamp inputs.
const OPAMP_INPUT_RESISTANCE: f64 = 1e9;

/// Built-in modified nodal analysis solver for linear circuits.
///
/// Handles operating point and DC sweep analyses of resistors, capacitors
/// (open), inductors (shorts), independent sources and ideal opamps.
/// Semiconductor and comparator elements need an external solver.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearSolver;

impl Solver for LinearSolver {
    fn name(&self) -> &str {
        "builtin"
    }

    fn solve(&self, netlist: &Netlist, request: &AnalysisRequest) -> Result<SimulationResult> {
        let system = System::new(netlist)?;
        debug!(
            "builtin solver: {} unknowns for {} elements",
            system.labels.len(),
            netlist.elements.len()
        );

        match request {
            AnalysisRequest::OperatingPoint => {
                let x = system.solve(None)?;
                Ok(SimulationResult::OperatingPoint {
                    nodes: system.node_voltages(&x).collect(),
                    branches: system.branch_currents(&x).collect(),
                })
            }
            AnalysisRequest::DcSweep(dc) => {
                let values = dc.points();
                let mut nodes: BTreeMap<String, Vec<f64>> = BTreeMap::new();
                let mut branches: BTreeMap<String, Vec<f64>> = BTreeMap::new();
                for value in &values {
                    let x = system.solve(Some((&dc.source, *value)))?;
                    for (node, v) in system.node_voltages(&x) {
                        nodes.entry(node).or_default().push(v);
                    }
                    for (designator, i) in system.branch_currents(&x) {
                        branches.entry(designator).or_default().push(i);
                    }
                }
                Ok(SimulationResult::DcSweep {
                    sweep: Sweep {
                        source: dc.source.clone(),
                        values,
                    },
                    nodes,
                    branches,
                })
            }
            AnalysisRequest::AcSweep(_) | AnalysisRequest::Transient(_) => bail!(
                "{} analysis is not available in the builtin solver; use ngspice",
                request.name()
            ),
        }
    }
}

/// Unknown layout of one netlist: node voltages first, then one branch
/// current per voltage source, inductor and opamp output.
struct System<'a> {
    netlist: &'a Netlist,
    nodes: HashMap<&'a str, usize>,
    branches: HashMap<&'a str, usize>,
    labels: Vec<&'a str>,
}

impl<'a> System<'a> {
    fn new(netlist: &'a Netlist) -> Result<Self> {
        let mut labels = netlist.nodes();
        let nodes = labels.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let mut branches = HashMap::new();
        for e in &netlist.elements {
            match &e.element {
                Element::VoltageSource(_) | Element::Inductor(_) | Element::OpAmp { .. } => {
                    branches.insert(e.designator.as_str(), labels.len());
                    labels.push(e.designator.as_str());
                }
                Element::Diode(_)
                | Element::Bjt(_)
                | Element::Mosfet(_)
                | Element::Comparator { .. }
                | Element::Adc { .. }
                | Element::Dac { .. } => {
                    bail!(
                        "{}: {} is nonlinear and needs the ngspice solver",
                        e.designator,
                        e.kind.name()
                    )
                }
                Element::Resistor(_) | Element::Capacitor(_) | Element::CurrentSource(_) => {}
            }
        }
        Ok(Self {
            netlist,
            nodes,
            branches,
            labels,
        })
    }

    fn node(&self, label: &str) -> Option<usize> {
        self.nodes.get(label).copied()
    }

    /// Stamp and solve. `sweep` overrides the DC value of one source.
    fn solve(&self, sweep: Option<(&str, f64)>) -> Result<Vec<f64>> {
        let size = self.labels.len();
        let mut a = vec![vec![0.0; size]; size];
        let mut b = vec![0.0; size];
        for i in 0..self.nodes.len() {
            a[i][i] += GMIN;
        }

        for e in &self.netlist.elements {
            let pins: Vec<Option<usize>> = e.nodes.iter().map(|n| self.node(n)).collect();
            let source_value = |source: &Source| match sweep {
                Some((designator, v)) if designator.eq_ignore_ascii_case(&e.designator) => v,
                _ => source.dc_value(),
            };
            match &e.element {
                Element::Resistor(r) => stamp_conductance(&mut a, pins[0], pins[1], 1.0 / r),
                Element::Capacitor(_) => {}
                Element::Inductor(_) => {
                    let k = self.branches[e.designator.as_str()];
                    stamp_voltage(&mut a, &mut b, k, pins[0], pins[1], 0.0);
                }
                Element::VoltageSource(source) => {
                    let k = self.branches[e.designator.as_str()];
                    stamp_voltage(&mut a, &mut b, k, pins[0], pins[1], source_value(source));
                }
                Element::CurrentSource(source) => {
                    let i = source_value(source);
                    if let Some(p) = pins[0] {
                        b[p] -= i;
                    }
                    if let Some(n) = pins[1] {
                        b[n] += i;
                    }
                }
                Element::OpAmp { gain } => {
                    let (out, inverting, non_inverting) = (pins[0], pins[1], pins[2]);
                    stamp_conductance(&mut a, non_inverting, inverting, 1.0 / OPAMP_INPUT_RESISTANCE);
                    let k = self.branches[e.designator.as_str()];
                    if let Some(o) = out {
                        a[o][k] += 1.0;
                        a[k][o] += 1.0;
                    }
                    if let Some(p) = non_inverting {
                        a[k][p] -= gain;
                    }
                    if let Some(n) = inverting {
                        a[k][n] += gain;
                    }
                }
                Element::Diode(_)
                | Element::Bjt(_)
                | Element::Mosfet(_)
                | Element::Comparator { .. }
                | Element::Adc { .. }
                | Element::Dac { .. } => {
                    bail!("{}: nonlinear element in linear system", e.designator)
                }
            }
        }

        solve_dense(a, b).map_err(|row| anyhow::anyhow!("singular circuit matrix at '{}'", self.labels[row]))
    }

    fn node_voltages<'x>(&'x self, x: &'x [f64]) -> impl Iterator<Item = (String, f64)> + 'x {
        self.nodes.iter().map(|(node, i)| (node.to_string(), x[*i]))
    }

    fn branch_currents<'x>(&'x self, x: &'x [f64]) -> impl Iterator<Item = (String, f64)> + 'x {
        self.netlist
            .current_branches()
            .map(|e| (e.designator.clone(), x[self.branches[e.designator.as_str()]]))
    }
}

fn stamp_conductance(a: &mut [Vec<f64>], p: Option<usize>, n: Option<usize>, g: f64) {
    if let Some(p) = p {
        a[p][p] += g;
    }
    if let Some(n) = n {
        a[n][n] += g;
    }
    if let (Some(p), Some(n)) = (p, n) {
        a[p][n] -= g;
        a[n][p] -= g;
    }
}

/// Branch current `k` flows into `p`, through the element, out of `n`.
fn stamp_voltage(a: &mut [Vec<f64>], b: &mut [f64], k: usize, p: Option<usize>, n: Option<usize>, volts: f64) {
    if let Some(p) = p {
        a[p][k] += 1.0;
        a[k][p] += 1.0;
    }
    if let Some(n) = n {
        a[n][k] -= 1.0;
        a[k][n] -= 1.0;
    }
    b[k] = volts;
}

/// Gaussian elimination with partial pivoting. On failure returns the
/// unknown whose pivot vanished.
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, usize> {
    let size = b.len();
    for col in 0..size {
        let pivot = (col..size)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(col);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = a[col].clone();
        for row in col + 1..size {
            let factor = a[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for (k, v) in pivot_row.iter().enumerate().skip(col) {
                a[row][k] -= factor * v;
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; size];
    for row in (0..size).rev() {
        let sum: f64 = (row + 1..size).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - sum) / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DcSweep;
    use circuit_core::{templates, Circuit, CircuitId, ComponentKind, ComponentValue};

    fn netlist(components: &[(ComponentKind, &[&str], ComponentValue)]) -> Netlist {
        let mut circuit = Circuit::new(CircuitId(1), "test");
        for (kind, nodes, value) in components {
            circuit
                .add_component(*kind, nodes.iter().copied(), value.clone())
                .unwrap();
        }
        Netlist::from_snapshot(&circuit.snapshot()).unwrap()
    }

    fn template(template: templates::Template) -> Netlist {
        let mut circuit = Circuit::new(CircuitId(1), template.name);
        for spec in &template.components {
            circuit.add_spec(spec).unwrap();
        }
        Netlist::from_snapshot(&circuit.snapshot()).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6 * b.abs().max(1.0)
    }

    #[test]
    fn test_divider_operating_point() {
        let result = LinearSolver
            .solve(&template(templates::voltage_divider()), &AnalysisRequest::OperatingPoint)
            .unwrap();
        assert!(close(result.voltage("in").unwrap(), 9.0));
        assert!(close(result.voltage("out").unwrap(), 4.5));
        // SPICE convention: current enters the positive terminal.
        assert!(close(result.current("V1").unwrap(), -4.5e-4));
    }

    #[test]
    fn test_current_source_into_resistor() {
        let result = LinearSolver
            .solve(
                &netlist(&[
                    (ComponentKind::CurrentSource, &["0", "a"], 1e-3.into()),
                    (ComponentKind::Resistor, &["a", "0"], 1e3.into()),
                ]),
                &AnalysisRequest::OperatingPoint,
            )
            .unwrap();
        assert!(close(result.voltage("a").unwrap(), 1.0));
    }

    #[test]
    fn test_inductor_is_short_and_capacitor_open() {
        let result = LinearSolver
            .solve(
                &netlist(&[
                    (ComponentKind::VoltageSource, &["in", "0"], 5.0.into()),
                    (ComponentKind::Inductor, &["in", "mid"], 1e-3.into()),
                    (ComponentKind::Resistor, &["mid", "0"], 100.0.into()),
                    (ComponentKind::Capacitor, &["mid", "0"], 1e-6.into()),
                ]),
                &AnalysisRequest::OperatingPoint,
            )
            .unwrap();
        assert!(close(result.voltage("mid").unwrap(), 5.0));
        assert!(close(result.current("L2").unwrap(), 0.05));
    }

    #[test]
    fn test_inverting_amplifier() {
        let result = LinearSolver
            .solve(&template(templates::inverting_amplifier()), &AnalysisRequest::OperatingPoint)
            .unwrap();
        let out = result.voltage("out").unwrap();
        assert!((out + 1.0).abs() < 1e-3, "out = {out}");
        assert!(result.voltage("inv").unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_dc_sweep() {
        let request = AnalysisRequest::DcSweep(DcSweep {
            source: "v1".into(),
            start: 0.0,
            stop: 10.0,
            step: 5.0,
        });
        let result = LinearSolver
            .solve(&template(templates::voltage_divider()), &request)
            .unwrap();
        let SimulationResult::DcSweep { sweep, nodes, .. } = result else {
            panic!("expected a dc sweep result");
        };
        assert_eq!(sweep.values, vec![0.0, 5.0, 10.0]);
        let out = &nodes["out"];
        assert!(close(out[0], 0.0) && close(out[1], 2.5) && close(out[2], 5.0));
    }

    #[test]
    fn test_parallel_sources_are_singular() {
        let err = LinearSolver
            .solve(
                &netlist(&[
                    (ComponentKind::VoltageSource, &["a", "0"], 1.0.into()),
                    (ComponentKind::VoltageSource, &["a", "0"], 2.0.into()),
                    (ComponentKind::Resistor, &["a", "0"], 1.0.into()),
                ]),
                &AnalysisRequest::OperatingPoint,
            )
            .unwrap_err();
        assert!(err.to_string().contains("singular"), "{err}");
    }

    #[test]
    fn test_rejects_nonlinear_elements() {
        let err = LinearSolver
            .solve(&template(templates::common_emitter()), &AnalysisRequest::OperatingPoint)
            .unwrap_err();
        insta::assert_snapshot!(err, @"Q6: bipolar transistor is nonlinear and needs the ngspice solver");
    }

    #[test]
    fn test_rejects_transient() {
        let request = AnalysisRequest::Transient(crate::analysis::Transient {
            step_time: 1e-6,
            end_time: 1e-3,
        });
        let err = LinearSolver
            .solve(&template(templates::voltage_divider()), &request)
            .unwrap_err();
        assert!(err.to_string().starts_with("transient analysis"));
    }
}
