use itertools::Itertools;
use thiserror::Error;

/// Why a circuit cannot be handed to a solver yet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Underconstrained {
    #[error("circuit has no components")]
    Empty,
    #[error("circuit has no reference node \"0\"")]
    NoGround,
    #[error("circuit has no voltage or current source")]
    NoSource,
    #[error("node(s) {} connect to only one terminal", .0.iter().map(|n| format!("'{n}'")).join(", "))]
    DanglingNodes(Vec<String>),
}

#[derive(Error, Debug)]
pub enum SimulationError {
    /// The circuit is not simulatable; fix it by adding components.
    #[error("underconstrained circuit: {0}")]
    Underconstrained(#[from] Underconstrained),

    #[error("invalid analysis request: {0}")]
    InvalidAnalysis(String),

    #[error("{designator}: unsupported device '{device}'")]
    UnsupportedDevice { designator: String, device: String },

    /// The solver ran (or tried to) and failed; `message` is its diagnostic text.
    #[error("{solver} failed: {message}")]
    Engine { solver: String, message: String },
}
