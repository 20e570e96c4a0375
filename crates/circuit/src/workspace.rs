use std::env;
use std::path::PathBuf;

use anyhow::Result;
use circuit_core::config::{CircuitToml, SolverKind};
use circuit_core::CircuitDirectory;
use circuit_sim::{LinearSolver, NgspiceSolver, Solver};
use clap::Args;
use log::debug;

use crate::output::OutputFormat;

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to circuit.toml (defaults to ./circuit.toml when present)
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        value_hint = clap::ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SolverArg {
    /// In-process linear solver
    Builtin,
    /// ngspice in batch mode
    Ngspice,
}

impl From<SolverArg> for SolverKind {
    fn from(arg: SolverArg) -> Self {
        match arg {
            SolverArg::Builtin => SolverKind::Builtin,
            SolverArg::Ngspice => SolverKind::Ngspice,
        }
    }
}

/// Configuration plus the circuit store it points at.
pub struct Workspace {
    pub config: CircuitToml,
    pub directory: CircuitDirectory,
}

impl Workspace {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let cwd = env::current_dir()?;
        let config = CircuitToml::discover(global.config.as_deref(), &cwd)?;
        debug!("Using circuit store {}", config.store.path.display());
        let directory = CircuitDirectory::load(&config.store.path)?;
        Ok(Self { config, directory })
    }

    pub fn save(&self) -> Result<()> {
        self.directory.save(&self.config.store.path)?;
        Ok(())
    }

    pub fn solver(&self, requested: Option<SolverArg>) -> Box<dyn Solver> {
        let kind = requested
            .map(SolverKind::from)
            .unwrap_or(self.config.simulation.solver);
        match kind {
            SolverKind::Builtin => Box::new(LinearSolver),
            SolverKind::Ngspice => Box::new(NgspiceSolver::new(&self.config.simulation.ngspice)),
        }
    }
}
