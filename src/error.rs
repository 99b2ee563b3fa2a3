//! Error types for the statement cache and execution layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StmtError>;

#[derive(Error, Debug)]
pub enum StmtError {
    /// Failure reported by the engine (prepare, step, reset or finalize).
    #[error("Engine error {code}: {message}")]
    Engine { code: i32, message: String },

    /// The engine gave up waiting on a lock; carries its own code and message.
    #[error("Database is busy ({code}): {message}")]
    Busy { code: i32, message: String },

    #[error("Database schema changed")]
    SchemaChanged,

    #[error("Incorrect number of bindings supplied: the statement uses {expected}, there are {supplied} supplied")]
    BindingCountMismatch { expected: usize, supplied: usize },

    #[error("Binding {index} has no name, but named bindings were supplied")]
    UnnamedBinding { index: usize },

    #[error("Unsupported binding type: {0}")]
    BindingType(String),

    #[error("Incomplete execution: there are still remaining statements or bindings to execute")]
    IncompleteExecution,

    #[error("Execution aborted by exec tracer")]
    TracerAbort,

    #[error("Row tracer failed: {0}")]
    RowTracer(#[source] anyhow::Error),

    #[error("Connection is already in use by another call")]
    ConcurrentUse,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StmtError {
    /// Engine result code, when the error came from the engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            StmtError::Engine { code, .. } | StmtError::Busy { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, StmtError::Busy { .. })
    }
}

impl From<serde_json::Error> for StmtError {
    fn from(err: serde_json::Error) -> Self {
        StmtError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for StmtError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => StmtError::Engine {
                code: failure.extended_code,
                message: message.unwrap_or_else(|| failure.to_string()),
            },
            other => StmtError::Engine {
                code: rusqlite::ffi::SQLITE_ERROR,
                message: other.to_string(),
            },
        }
    }
}
