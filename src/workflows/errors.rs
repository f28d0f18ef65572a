use crate::github::AuthError;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

use super::types::WorkflowKey;

/// Errors surfaced by the mutation and aggregation paths
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("workflow {0} is already tracked")]
    Duplicate(WorkflowKey),
    #[error("workflow {0} is not tracked")]
    NotFound(WorkflowKey),
    #[error("config document was modified concurrently")]
    VersionConflict,
    #[error("config document kept changing; gave up after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },
    #[error("config store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("GitHub authentication failed: {0}")]
    Auth(#[from] AuthError),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict => WorkflowError::VersionConflict,
            StoreError::Unavailable(msg) => WorkflowError::StoreUnavailable(msg),
        }
    }
}

/// Client-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ValidationError,
    DuplicateError,
    NotFoundError,
    VersionConflict,
    ConflictExhausted,
    StoreUnavailable,
    AuthError,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::ValidationError,
            WorkflowError::Duplicate(_) => ErrorKind::DuplicateError,
            WorkflowError::NotFound(_) => ErrorKind::NotFoundError,
            WorkflowError::VersionConflict => ErrorKind::VersionConflict,
            WorkflowError::ConflictExhausted { .. } => ErrorKind::ConflictExhausted,
            WorkflowError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            WorkflowError::Auth(_) => ErrorKind::AuthError,
        }
    }

    /// HTTP-equivalent status for the hosting layer
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::ValidationError => 400,
            ErrorKind::NotFoundError => 404,
            ErrorKind::DuplicateError
            | ErrorKind::VersionConflict
            | ErrorKind::ConflictExhausted => 409,
            ErrorKind::AuthError => 502,
            ErrorKind::StoreUnavailable => 503,
        }
    }
}

/// Structured error payload: `{ "error": <kind>, "message": <text> }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl From<&WorkflowError> for ErrorBody {
    fn from(err: &WorkflowError) -> Self {
        Self {
            error: err.kind(),
            message: err.to_string(),
        }
    }
}
