//! Error type returned by the relationship and group operations.

use crate::storage::StorageError;

#[derive(Debug)]
pub enum GraphError {
    /// Profile, group, edge or member does not exist.
    NotFound(String),
    /// The current state does not allow the requested transition.
    Conflict(String),
    /// The caller lacks the membership or role the operation needs.
    Unauthorized(String),
    /// The request itself is malformed, e.g. a profile targeting itself.
    InvalidArgument(String),
    /// The first half of a paired write committed but the second did not.
    PartialFailure {
        message: String,
        /// True when the first write was rolled back and the pair is unchanged.
        compensated: bool,
    },
    Storage(StorageError),
}

impl GraphError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        GraphError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GraphError::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        GraphError::Unauthorized(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        GraphError::InvalidArgument(msg.into())
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::NotFound(_) => "not_found",
            GraphError::Conflict(_) => "conflict",
            GraphError::Unauthorized(_) => "unauthorized",
            GraphError::InvalidArgument(_) => "invalid_argument",
            GraphError::PartialFailure { .. } => "partial_failure",
            GraphError::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::NotFound(msg) => write!(f, "not found: {msg}"),
            GraphError::Conflict(msg) => write!(f, "conflict: {msg}"),
            GraphError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            GraphError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            GraphError::PartialFailure {
                message,
                compensated,
            } => {
                if *compensated {
                    write!(f, "partial failure (rolled back, safe to retry): {message}")
                } else {
                    write!(f, "partial failure (pair left inconsistent): {message}")
                }
            }
            GraphError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<StorageError> for GraphError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => GraphError::NotFound(msg),
            StorageError::AlreadyExists(msg) => GraphError::Conflict(format!("{msg} already exists")),
            other => GraphError::Storage(other),
        }
    }
}
