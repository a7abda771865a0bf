//! Error types for the data layer and the change-set processor

use rel_merge::MergeError;

/// Result type for data-layer operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by stores, repositories and partition locks.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A write carried a stale or missing concurrency token
    #[error("Concurrency conflict on {entity} {key}")]
    Concurrency { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Anonymous users cannot change partition locks")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl DataError {
    pub fn concurrency(entity: &'static str, key: impl ToString) -> Self {
        DataError::Concurrency { entity, key: key.to_string() }
    }

    pub fn is_concurrency(&self) -> bool {
        matches!(self, DataError::Concurrency { .. })
    }
}

/// Failures surfaced by [`ChangeSetProcessor`](crate::ChangeSetProcessor).
///
/// Concurrency conflicts never show up here; they are resolved or returned
/// as a reconciliation change set.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Malformed change set; a caller bug
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Partition {0} does not exist")]
    EntityNotFound(i64),

    /// The partition is locked by someone else, or escalation failed
    #[error("Partition {0} is locked by another user")]
    PessimisticLock(i64),

    #[error("Change set failed validation {}: {}", stage(.after_resolution), joined(.errors))]
    InvalidData { after_resolution: bool, errors: Vec<String> },

    #[error("Anonymous users cannot change partition locks")]
    Unauthorized,

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Data error: {0}")]
    Data(DataError),
}

fn stage(after_resolution: &bool) -> &'static str {
    if *after_resolution {
        "after conflict resolution"
    } else {
        "before apply"
    }
}

fn joined(errors: &[String]) -> String {
    errors.join("; ")
}

impl From<DataError> for ProcessError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Unauthorized => ProcessError::Unauthorized,
            other => ProcessError::Data(other),
        }
    }
}
