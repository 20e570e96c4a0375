use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};

use super::Solver;
use crate::analysis::AnalysisRequest;
use crate::netlist::{spice_number, Netlist};
use crate::result::{Phasors, SimulationResult, Sweep};

const DECK_FILE: &str = "circuit.cir";
const DATA_FILE: &str = "results.txt";

/// Runs ngspice in batch mode on a generated deck and reads back its output.
///
/// Operating points are read from `print` output on stdout; sweeps and
/// transients are written with `wrdata` into a scratch directory that is
/// removed when the solve finishes.
#[derive(Debug, Clone)]
pub struct NgspiceSolver {
    program: PathBuf,
}

impl Default for NgspiceSolver {
    fn default() -> Self {
        Self::new("ngspice")
    }
}

impl NgspiceSolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, deck: &Path, workdir: &Path) -> Result<String> {
        debug!("Running {} -b {}", self.program.display(), deck.display());
        let output = duct::cmd(self.program.as_path(), [OsStr::new("-b"), deck.as_os_str()])
            .dir(workdir)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => anyhow!(
                    "ngspice executable not found (looked for '{}')",
                    self.program.display()
                ),
                _ => anyhow!(e).context(format!("Failed to run {}", self.program.display())),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!("exited with {}: {}", output.status, diagnostics(&stderr, &stdout));
        }
        if !stderr.trim().is_empty() {
            warn!("ngspice: {}", stderr.trim());
        }
        Ok(stdout)
    }
}

impl Solver for NgspiceSolver {
    fn name(&self) -> &str {
        "ngspice"
    }

    fn solve(&self, netlist: &Netlist, request: &AnalysisRequest) -> Result<SimulationResult> {
        let workdir = tempfile::tempdir().context("Failed to create ngspice scratch directory")?;
        let deck = workdir.path().join(DECK_FILE);
        let data = workdir.path().join(DATA_FILE);

        let probes = probes(netlist);
        let control = control_block(request, &probes, &data);
        let mut file = File::create(&deck).context("Failed to write ngspice deck")?;
        netlist.write_deck(&mut file, Some(&control))?;
        drop(file);

        let stdout = self.run(&deck, workdir.path())?;
        match request {
            AnalysisRequest::OperatingPoint => parse_print(&stdout, &probes),
            _ => {
                let table = std::fs::read_to_string(&data).map_err(|_| {
                    anyhow!("produced no results: {}", diagnostics("", &stdout))
                })?;
                parse_wrdata(request, &table, &probes)
            }
        }
    }
}

/// A quantity read back from ngspice: a node voltage or a branch current.
#[derive(Debug, Clone, PartialEq)]
struct Probe {
    /// Key in the raw result: the node label, or `v1#branch`.
    key: String,
    branch: bool,
}

impl Probe {
    fn vector(&self) -> String {
        if self.branch {
            self.key.clone()
        } else {
            format!("v({})", self.key)
        }
    }
}

fn probes(netlist: &Netlist) -> Vec<Probe> {
    let nodes = netlist.nodes().into_iter().map(|node| Probe {
        key: node.to_string(),
        branch: false,
    });
    let branches = netlist.current_branches().map(|e| Probe {
        key: format!("{}#branch", e.designator.to_ascii_lowercase()),
        branch: true,
    });
    nodes.chain(branches).collect()
}

/// Columns requested from ngspice, in output order.
fn columns(request: &AnalysisRequest, probes: &[Probe]) -> Vec<String> {
    match request {
        AnalysisRequest::AcSweep(_) => probes
            .iter()
            .flat_map(|p| {
                let v = p.vector();
                [format!("vm({v})"), format!("vp({v})")]
            })
            .collect(),
        _ => probes.iter().map(Probe::vector).collect(),
    }
}

fn analysis_line(request: &AnalysisRequest) -> String {
    match request {
        AnalysisRequest::OperatingPoint => "op".to_string(),
        AnalysisRequest::DcSweep(dc) => format!(
            "dc {} {} {} {}",
            dc.source.to_ascii_lowercase(),
            spice_number(dc.start),
            spice_number(dc.stop),
            spice_number(dc.step)
        ),
        AnalysisRequest::AcSweep(ac) => format!(
            "ac {} {} {} {}",
            ac.variation.as_str(),
            ac.points,
            spice_number(ac.start_frequency),
            spice_number(ac.stop_frequency)
        ),
        AnalysisRequest::Transient(tran) => format!(
            "tran {} {}",
            spice_number(tran.step_time),
            spice_number(tran.end_time)
        ),
    }
}

fn control_block(request: &AnalysisRequest, probes: &[Probe], data: &Path) -> String {
    let columns = columns(request, probes).join(" ");
    let mut block = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(block, ".control");
    let _ = writeln!(block, "set noaskquit");
    let _ = writeln!(block, "set wr_vecnames");
    let _ = writeln!(block, "set wr_singlescale");
    let _ = writeln!(block, "{}", analysis_line(request));
    match request {
        AnalysisRequest::OperatingPoint => {
            let _ = writeln!(block, "print {columns}");
        }
        _ => {
            let _ = writeln!(block, "wrdata {} {columns}", data.display());
        }
    }
    let _ = writeln!(block, "quit");
    let _ = writeln!(block, ".endc");
    block
}

/// Parse `name = value` lines printed for an operating point.
fn parse_print(stdout: &str, probes: &[Probe]) -> Result<SimulationResult> {
    let printed: BTreeMap<String, f64> = stdout
        .lines()
        .filter_map(|line| line.split_once('='))
        .filter_map(|(name, value)| {
            let value = value.split_whitespace().next()?.parse::<f64>().ok()?;
            Some((name.trim().to_ascii_lowercase(), value))
        })
        .collect();

    let mut nodes = BTreeMap::new();
    let mut branches = BTreeMap::new();
    for probe in probes {
        let vector = probe.vector().to_ascii_lowercase();
        let value = printed
            .get(&vector)
            .copied()
            .ok_or_else(|| anyhow!("output has no value for {vector}: {}", diagnostics("", stdout)))?;
        if probe.branch {
            branches.insert(probe.key.clone(), value);
        } else {
            nodes.insert(probe.key.clone(), value);
        }
    }
    Ok(SimulationResult::OperatingPoint { nodes, branches })
}

/// Parse a `wrdata` table into its scale column and one column per request.
/// A complex scale (AC frequency) occupies two leading columns.
fn parse_table(text: &str, columns: usize) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let mut scale = Vec::new();
    let mut data = vec![Vec::new(); columns];
    for (line_no, line) in text.lines().enumerate() {
        let row: Vec<f64> = match line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<Vec<f64>, _>>()
        {
            Ok(row) if !row.is_empty() => row,
            // Header with vector names, or blank.
            _ => continue,
        };
        let skip = match row.len() {
            n if n == columns + 1 => 1,
            n if n == columns + 2 => 2,
            n => bail!(
                "line {}: expected {} columns of results, found {n}",
                line_no + 1,
                columns + 1
            ),
        };
        scale.push(row[0]);
        for (column, value) in data.iter_mut().zip(&row[skip..]) {
            column.push(*value);
        }
    }
    if scale.is_empty() {
        bail!("result table is empty");
    }
    Ok((scale, data))
}

fn parse_wrdata(request: &AnalysisRequest, text: &str, probes: &[Probe]) -> Result<SimulationResult> {
    let (scale, data) = parse_table(text, columns(request, probes).len())?;

    let result = match request {
        AnalysisRequest::AcSweep(_) => {
            let mut nodes = BTreeMap::new();
            let mut branches = BTreeMap::new();
            for (probe, pair) in probes.iter().zip(data.chunks(2)) {
                let phasors = Phasors {
                    magnitude: pair[0].clone(),
                    phase: pair[1].iter().map(|rad| rad * 180.0 / PI).collect(),
                };
                if probe.branch {
                    branches.insert(probe.key.clone(), phasors);
                } else {
                    nodes.insert(probe.key.clone(), phasors);
                }
            }
            SimulationResult::AcSweep {
                frequency: scale,
                nodes,
                branches,
            }
        }
        _ => {
            let mut nodes = BTreeMap::new();
            let mut branches = BTreeMap::new();
            for (probe, column) in probes.iter().zip(data) {
                if probe.branch {
                    branches.insert(probe.key.clone(), column);
                } else {
                    nodes.insert(probe.key.clone(), column);
                }
            }
            match request {
                AnalysisRequest::DcSweep(dc) => SimulationResult::DcSweep {
                    sweep: Sweep {
                        source: dc.source.clone(),
                        values: scale,
                    },
                    nodes,
                    branches,
                },
                _ => SimulationResult::Transient {
                    time: scale,
                    nodes,
                    branches,
                },
            }
        }
    };
    Ok(result)
}

/// Last few meaningful lines of solver output, for error messages.
fn diagnostics(stderr: &str, stdout: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let tail = &lines[lines.len().saturating_sub(5)..];
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AcSweep, DcSweep};
    use circuit_core::{templates, Circuit, CircuitId};

    fn divider() -> Netlist {
        let mut circuit = Circuit::new(CircuitId(1), "divider");
        for spec in &templates::voltage_divider().components {
            circuit.add_spec(spec).unwrap();
        }
        Netlist::from_snapshot(&circuit.snapshot()).unwrap()
    }

    #[test]
    fn test_control_block() {
        let request = AnalysisRequest::DcSweep(DcSweep {
            source: "V1".into(),
            start: 0.0,
            stop: 9.0,
            step: 0.5,
        });
        let control = control_block(&request, &probes(&divider()), Path::new("/tmp/results.txt"));
        insta::assert_snapshot!(control, @r"
        .control
        set noaskquit
        set wr_vecnames
        set wr_singlescale
        dc v1 0 9 0.5
        wrdata /tmp/results.txt v(in) v(out) v1#branch
        quit
        .endc
        ");
    }

    #[test]
    fn test_ac_columns() {
        let request = AnalysisRequest::AcSweep(AcSweep::default());
        assert_eq!(analysis_line(&request), "ac dec 10 1 1e6");
        assert_eq!(
            columns(&request, &probes(&divider()))[..2],
            ["vm(v(in))".to_string(), "vp(v(in))".to_string()]
        );
    }

    #[test]
    fn test_parse_print() {
        let stdout = "\
Circuit: * divider

Doing analysis at TEMP = 27.000000 and TNOM = 27.000000

v(in) = 9.000000e+00
v(out) = 4.500000e+00
v1#branch = -4.50000e-04
";
        let result = parse_print(stdout, &probes(&divider())).unwrap();
        assert_eq!(
            result,
            SimulationResult::OperatingPoint {
                nodes: [("in".to_string(), 9.0), ("out".to_string(), 4.5)]
                    .into_iter()
                    .collect(),
                branches: [("v1#branch".to_string(), -4.5e-4)].into_iter().collect(),
            }
        );
    }

    #[test]
    fn test_parse_print_missing_vector() {
        let err = parse_print("v(in) = 9.0\n", &probes(&divider())).unwrap_err();
        assert!(err.to_string().contains("no value for v(out)"), "{err}");
    }

    #[test]
    fn test_parse_dc_table() {
        let request = AnalysisRequest::DcSweep(DcSweep {
            source: "V1".into(),
            start: 0.0,
            stop: 2.0,
            step: 1.0,
        });
        let table = "\
 v-sweep v(in) v(out) v1#branch
 0.00000000e+00  0.00000000e+00  0.00000000e+00  0.00000000e+00
 1.00000000e+00  1.00000000e+00  5.00000000e-01 -5.00000000e-05
 2.00000000e+00  2.00000000e+00  1.00000000e+00 -1.00000000e-04
";
        let result = parse_wrdata(&request, table, &probes(&divider())).unwrap();
        let SimulationResult::DcSweep { sweep, nodes, branches } = result else {
            panic!("expected a dc sweep result");
        };
        assert_eq!(sweep.values, vec![0.0, 1.0, 2.0]);
        assert_eq!(nodes["out"], vec![0.0, 0.5, 1.0]);
        assert_eq!(branches["v1#branch"], vec![0.0, -5e-5, -1e-4]);
    }

    #[test]
    fn test_parse_ac_table_with_complex_scale() {
        let request = AnalysisRequest::AcSweep(AcSweep::default());
        let probes = vec![Probe {
            key: "out".into(),
            branch: false,
        }];
        let table = "\
 frequency vm(v(out)) vp(v(out))
 1.0e+00 0.0e+00 1.0e+00 0.0e+00
 1.0e+01 0.0e+00 7.0e-01 -7.85398163e-01
";
        let SimulationResult::AcSweep { frequency, nodes, .. } =
            parse_wrdata(&request, table, &probes).unwrap()
        else {
            panic!("expected an ac sweep result");
        };
        assert_eq!(frequency, vec![1.0, 10.0]);
        assert_eq!(nodes["out"].magnitude, vec![1.0, 0.7]);
        assert!((nodes["out"].phase[1] + 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_table_column_mismatch() {
        let err = parse_table("1 2 3 4 5 6\n", 2).unwrap_err();
        insta::assert_snapshot!(err, @"line 1: expected 3 columns of results, found 6");
    }

    #[test]
    fn test_missing_executable() {
        let solver = NgspiceSolver::new("circuit-test-no-such-ngspice");
        let err = solver
            .solve(&divider(), &AnalysisRequest::OperatingPoint)
            .unwrap_err();
        assert!(err.to_string().starts_with("ngspice executable not found"), "{err}");
    }
}
