use clap::{Parser, Subcommand};

mod circuits;
mod components;
mod draw;
mod output;
mod sim;
mod workspace;

use workspace::GlobalArgs;

#[derive(Parser)]
#[command(name = "circuit")]
#[command(about = "Build, version, simulate and draw circuits", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a circuit, optionally from a template
    New(circuits::NewArgs),

    /// List circuits in the store
    #[command(alias = "ls")]
    List,

    /// Show the components of a circuit
    Show(circuits::ShowArgs),

    /// List starter templates
    Templates,

    /// Add a component
    Add(components::AddArgs),

    /// Remove a component
    Rm(components::RmArgs),

    /// Change the value of a component
    Set(components::SetArgs),

    /// Rename a circuit without creating a version
    Rename(circuits::RenameArgs),

    /// Show the version history of a circuit
    History(circuits::CircuitArg),

    /// Restore the components of an earlier version
    Rollback(circuits::RollbackArgs),

    /// Delete a circuit
    Delete(circuits::CircuitArg),

    /// Print the SPICE netlist of a circuit
    Netlist(sim::NetlistArgs),

    /// Run an analysis
    Sim(sim::SimArgs),

    /// Draw a schematic
    Draw(draw::DrawArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        Commands::New(args) => circuits::new(args, global),
        Commands::List => circuits::list(global),
        Commands::Show(args) => circuits::show(args, global),
        Commands::Templates => circuits::templates(global),
        Commands::Add(args) => components::add(args, global),
        Commands::Rm(args) => components::remove(args, global),
        Commands::Set(args) => components::set(args, global),
        Commands::Rename(args) => circuits::rename(args, global),
        Commands::History(args) => circuits::history(args, global),
        Commands::Rollback(args) => circuits::rollback(args, global),
        Commands::Delete(args) => circuits::delete(args, global),
        Commands::Netlist(args) => sim::netlist(args, global),
        Commands::Sim(args) => sim::execute(args, global),
        Commands::Draw(args) => draw::execute(args, global),
    }
}
