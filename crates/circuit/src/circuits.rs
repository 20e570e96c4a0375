use anyhow::{bail, Result};
use circuit_core::{templates, Change, CircuitId, CircuitState};
use clap::Args;
use colored::Colorize;
use comfy_table::Cell;
use serde::Serialize;

use crate::output::{print_json, table, OutputFormat};
use crate::workspace::{GlobalArgs, Workspace};

#[derive(Args, Debug)]
pub struct CircuitArg {
    /// Circuit id
    pub circuit: u32,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Circuit name (defaults to the template name, or "Circuit <id>")
    pub name: Option<String>,

    /// Start from a starter circuit (see `circuit templates`)
    #[arg(short, long)]
    pub template: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Circuit id
    pub circuit: u32,

    /// Show an earlier version instead of the current one
    #[arg(long)]
    pub version: Option<usize>,
}

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Circuit id
    pub circuit: u32,

    /// Version to restore
    pub version: usize,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    /// Circuit id
    pub circuit: u32,

    /// New name
    pub name: String,
}

#[derive(Serialize)]
struct HistoryEntry {
    version: usize,
    change: Change,
    components: usize,
}

pub fn new(args: NewArgs, global: &GlobalArgs) -> Result<()> {
    let mut ws = Workspace::open(global)?;
    let id = match &args.template {
        Some(name) => {
            let Some(template) = templates::find(name) else {
                let available: Vec<&str> = templates::all().iter().map(|t| t.name).collect();
                bail!(
                    "Unknown template '{name}' (available: {})",
                    available.join(", ")
                );
            };
            let name = args.name.as_deref().unwrap_or(template.name);
            ws.directory
                .create_circuit_with(Some(name), &template.components)?
        }
        None => ws.directory.create_circuit(args.name.as_deref()),
    };
    ws.save()?;

    let state = ws.directory.with_circuit(id, |c| Ok(c.state()))?;
    match global.format {
        OutputFormat::Human => println!(
            "{} Created circuit {} '{}' (v{}, {} components)",
            "✓".green(),
            id.to_string().bold(),
            state.name,
            state.version,
            state.components.len()
        ),
        OutputFormat::Json => print_json(&state)?,
    }
    Ok(())
}

pub fn list(global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let circuits = ws.directory.list_circuits();
    match global.format {
        OutputFormat::Json => print_json(&circuits)?,
        OutputFormat::Human if circuits.is_empty() => println!("No circuits"),
        OutputFormat::Human => {
            let mut table = table(&["Id", "Name", "Version", "Components"]);
            for summary in &circuits {
                table.add_row(vec![
                    Cell::new(summary.circuit_id),
                    Cell::new(&summary.name),
                    Cell::new(summary.version),
                    Cell::new(summary.components),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

pub fn show(args: ShowArgs, global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let state = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| match args.version {
            None => Ok(c.state()),
            Some(version) => Ok(CircuitState {
                circuit_id: c.id(),
                name: c.name().to_string(),
                version,
                components: c.get_version(version)?.values().cloned().collect(),
            }),
        })?;

    match global.format {
        OutputFormat::Json => print_json(&state)?,
        OutputFormat::Human => print_state(&state),
    }
    Ok(())
}

pub fn print_state(state: &CircuitState) {
    println!(
        "{} {} '{}' (v{})",
        "Circuit".blue().bold(),
        state.circuit_id,
        state.name,
        state.version
    );
    if state.components.is_empty() {
        println!("No components");
        return;
    }
    let mut table = table(&["Designator", "Kind", "Nodes", "Value"]);
    for component in &state.components {
        table.add_row(vec![
            Cell::new(component.designator()),
            Cell::new(component.kind),
            Cell::new(component.nodes.join(" ")),
            Cell::new(component.value_label()),
        ]);
    }
    println!("{table}");
}

pub fn templates(global: &GlobalArgs) -> Result<()> {
    let all = templates::all();
    match global.format {
        OutputFormat::Json => {
            let entries: Vec<_> = all
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "components": t.components,
                    })
                })
                .collect();
            print_json(&entries)?;
        }
        OutputFormat::Human => {
            let mut table = table(&["Name", "Components", "Description"]);
            for template in &all {
                table.add_row(vec![
                    Cell::new(template.name),
                    Cell::new(template.components.len()),
                    Cell::new(template.description),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

pub fn history(args: CircuitArg, global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let (current, entries) = ws.directory.with_circuit(CircuitId(args.circuit), |c| {
        let entries: Vec<HistoryEntry> = c
            .history()
            .iter()
            .map(|rev| HistoryEntry {
                version: rev.version,
                change: rev.change,
                components: rev.components.len(),
            })
            .collect();
        Ok((c.current_version(), entries))
    })?;

    match global.format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Human => {
            let mut table = table(&["Version", "Change", "Components"]);
            for entry in &entries {
                let version = if entry.version == current {
                    format!("{} *", entry.version)
                } else {
                    entry.version.to_string()
                };
                table.add_row(vec![
                    Cell::new(version),
                    Cell::new(entry.change),
                    Cell::new(entry.components),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

pub fn rollback(args: RollbackArgs, global: &GlobalArgs) -> Result<()> {
    let ws = Workspace::open(global)?;
    let snapshot = ws
        .directory
        .with_circuit(CircuitId(args.circuit), |c| c.rollback(args.version))?;
    ws.save()?;

    let state = snapshot.state();
    match global.format {
        OutputFormat::Human => {
            println!(
                "{} Restored version {} as version {}",
                "✓".green(),
                args.version,
                state.version
            );
            print_state(&state);
        }
        OutputFormat::Json => print_json(&state)?,
    }
    Ok(())
}

/// Renaming leaves the version history untouched.
pub fn rename(args: RenameArgs, global: &GlobalArgs) -> Result<()> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("Circuit name must not be empty");
    }
    let ws = Workspace::open(global)?;
    let state = ws.directory.with_circuit(CircuitId(args.circuit), |c| {
        c.rename(name);
        Ok(c.state())
    })?;
    ws.save()?;
    match global.format {
        OutputFormat::Human => println!(
            "{} Renamed circuit {} to '{}'",
            "✓".green(),
            state.circuit_id,
            state.name
        ),
        OutputFormat::Json => print_json(&state)?,
    }
    Ok(())
}

pub fn delete(args: CircuitArg, global: &GlobalArgs) -> Result<()> {
    let mut ws = Workspace::open(global)?;
    let id = CircuitId(args.circuit);
    ws.directory.delete_circuit(id)?;
    ws.save()?;
    match global.format {
        OutputFormat::Human => println!("{} Deleted circuit {id}", "✓".green()),
        OutputFormat::Json => print_json(&serde_json::json!({ "deleted": id }))?,
    }
    Ok(())
}
