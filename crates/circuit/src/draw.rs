use std::path::PathBuf;

use anyhow::Result;
use circuit_core::CircuitId;
use circuit_sch::{default_output_path, draw, SvgRenderer};
use clap::Args;
use colored::Colorize;

use crate::output::{print_json, OutputFormat};
use crate::workspace::{GlobalArgs, Workspace};

#[derive(Args, Debug)]
pub struct DrawArgs {
    /// Circuit id
    pub circuit: u32,

    /// Output .svg file; SVG is the only supported format (defaults to
    /// <output_dir>/circuit_<id>_v<version>.svg)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Title drawn above the schematic
    #[arg(long)]
    pub title: Option<String>,
}

pub fn execute(args: DrawArgs, global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let snapshot = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| Ok(c.snapshot()))?;

    let output = args.output.unwrap_or_else(|| {
        default_output_path(
            &ws.config.schematic.output_dir,
            snapshot.circuit_id,
            snapshot.version,
            "svg",
        )
    });
    let written = draw(&snapshot, args.title.as_deref(), output, &SvgRenderer)?;

    match global.format {
        OutputFormat::Human => println!(
            "{} Wrote schematic to {}",
            "✓".green(),
            written.display().to_string().bold()
        ),
        OutputFormat::Json => print_json(&serde_json::json!({
            "circuit_id": snapshot.circuit_id,
            "version": snapshot.version,
            "path": written,
        }))?,
    }
    Ok(())
}
