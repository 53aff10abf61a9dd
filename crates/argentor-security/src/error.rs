use thiserror::Error;

/// Errors raised while recording or querying the audit trail.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("audit store error: {0}")]
    Store(#[from] argentor_storage::StorageError),
}

pub type SecurityResult<T> = Result<T, SecurityError>;

impl From<SecurityError> for argentor_core::AgentorError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Store(e) => e.into(),
        }
    }
}
