use std::path::PathBuf;

/// Errors produced by the recorder core.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// Targets file is malformed (missing columns, duplicate ids, unsupported type).
    #[error("targets file format error: {0}")]
    Format(String),

    /// A previous session could not be reconstructed from its results folder.
    #[error("cannot resume session from {path}: {reason}")]
    Resume { path: PathBuf, reason: String },

    /// Writing one of the ledger files failed. The in-memory session is intact.
    #[error("failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A fresh session was started in a folder that already has a ledger.
    #[error("{path} already holds a session, use `resume` to continue it")]
    SessionExists { path: PathBuf },

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// Operation is not allowed in the current session phase.
    #[error("{operation} is not allowed while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: crate::controller::Phase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("target '{0}' not found in catalog")]
    TargetNotFound(String),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

impl RecorderError {
    pub(crate) fn resume(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RecorderError::Resume {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::Persistence {
            path: path.into(),
            source,
        }
    }
}
