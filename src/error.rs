use thiserror::Error;

use uuid::Uuid;

/// Result type for all engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// Read or write failure against the snapshot store, a ledger,
    /// or a raw domain table. Aborts the operation; no partial snapshot.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Storage failure raised by a non-SQL backend.
    #[error("storage error: {0}")]
    Backend(String),

    /// Cache read/write failure. Callers must fall back to the store,
    /// never treat this as fatal for a read path.
    #[error("cache error: {0}")]
    Cache(String),

    /// Best-effort attendance aggregation finished with per-class failures.
    /// Successful classes keep their snapshots.
    #[error("attendance aggregation failed for {} of {attempted} classes", failures.len())]
    AttendancePartial {
        attempted: usize,
        failures: Vec<(Uuid, String)>,
    },
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}
