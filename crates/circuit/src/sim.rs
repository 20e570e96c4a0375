use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use circuit_core::{format_si, CircuitId};
use circuit_sim::{simulate, AnalysisRequest, Netlist, SimulationResult};
use clap::Args;
use colored::Colorize;
use serde_json::{Map, Number, Value};

use crate::components::parse_si;
use crate::output::{print_json, table, OutputFormat};
use crate::workspace::{GlobalArgs, SolverArg, Workspace};

#[derive(Args, Debug)]
pub struct SimArgs {
    /// Circuit id
    pub circuit: u32,

    /// Analysis: op, dc, ac or tran
    #[arg(short, long, default_value = "op")]
    pub analysis: String,

    /// Analysis parameter as KEY=VALUE, e.g. source=V1 start=0 stop=9 step=1
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Override the solver from circuit.toml
    #[arg(long, value_enum)]
    pub solver: Option<SolverArg>,
}

#[derive(Args, Debug)]
pub struct NetlistArgs {
    /// Circuit id
    pub circuit: u32,

    /// Output path; "-" writes to stdout
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,
}

fn get_output_writer(path: &str) -> Result<Box<dyn Write>> {
    Ok(if path == "-" {
        Box::new(std::io::stdout())
    } else {
        Box::new(File::create(path).with_context(|| format!("Failed to create {path}"))?)
    })
}

pub fn netlist(args: NetlistArgs, global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let snapshot = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| Ok(c.snapshot()))?;
    let netlist = Netlist::from_snapshot(&snapshot)?;

    let mut out = get_output_writer(&args.output.to_string_lossy())?;
    netlist.write_spice(&mut out)?;
    out.flush()?;
    Ok(())
}

pub fn execute(args: SimArgs, global: &GlobalArgs) -> Result<()> {
    let parameters = parse_params(&args.params)?;
    let request = AnalysisRequest::from_parameters(&args.analysis, &parameters)?;

    let ws = Workspace::open(global)?;
    let snapshot = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| Ok(c.snapshot()))?;
    let solver = ws.solver(args.solver);
    let result = simulate(&snapshot, &request, solver.as_ref())?;

    match (global.format, &result) {
        (OutputFormat::Human, SimulationResult::OperatingPoint { nodes, branches }) => {
            println!(
                "{} {} v{} with {}",
                "Operating point".blue().bold(),
                snapshot.name,
                snapshot.version,
                solver.name()
            );
            let mut table = table(&["Quantity", "Value"]);
            for (node, v) in nodes {
                table.add_row(vec![format!("V({node})"), format_si(*v, "V")]);
            }
            for (designator, i) in branches {
                table.add_row(vec![format!("I({designator})"), format_si(*i, "A")]);
            }
            println!("{table}");
        }
        // Sweeps have no compact table form.
        _ => print_json(&result)?,
    }
    Ok(())
}

/// Collect `KEY=VALUE` pairs into a parameter object. Integral numbers stay
/// integers so counts such as `points` deserialize.
fn parse_params(entries: &[String]) -> Result<Map<String, Value>> {
    let mut parameters = Map::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid parameter '{entry}', expected KEY=VALUE");
        };
        let value = match parse_si(value) {
            Ok(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Value::from(n as i64),
            Ok(n) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            Err(_) => Value::String(value.to_string()),
        };
        parameters.insert(key.trim().to_string(), value);
    }
    Ok(parameters)
}
