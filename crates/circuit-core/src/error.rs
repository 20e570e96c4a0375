use thiserror::Error;

use crate::model::{CircuitId, ComponentId};
use crate::registry::ComponentKind;

/// Modeling errors. All of them are recoverable by correcting the request;
/// a failed operation never leaves a partially applied mutation behind.
#[derive(Error, Debug)]
pub enum CircuitError {
    #[error("unknown component kind '{0}'")]
    UnknownKind(String),

    #[error("invalid {kind} component: {reason}")]
    InvalidComponent { kind: ComponentKind, reason: String },

    #[error("component {0} not found")]
    ComponentNotFound(ComponentId),

    #[error("version {requested} not found (current version is {current})")]
    VersionNotFound { requested: usize, current: usize },

    #[error("circuit {0} not found")]
    CircuitNotFound(CircuitId),

    #[error("corrupt circuit store: {0}")]
    CorruptStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CircuitError {
    pub(crate) fn invalid(kind: ComponentKind, reason: impl Into<String>) -> Self {
        Self::InvalidComponent {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CircuitError> = std::result::Result<T, E>;
