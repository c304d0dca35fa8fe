use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Failure taxonomy of the page-interaction layer.
///
/// The batch runner keys its policy off these variants: transient failures
/// are retried with backoff, permanent ones skip the link, and an expired
/// session aborts the whole run so the operator can log in again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("transient load failure: {0}")]
    TransientLoad(String),

    #[error("page structure mismatch: {0}")]
    PermanentParse(String),

    #[error("session expired: {0}")]
    SessionExpired(String),
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::TransientLoad(_))
    }
}

/// Errors touching the persisted files (progress state, link list, master
/// dataset). Any of these aborts the run immediately; the on-disk files are
/// only ever replaced whole via temp-then-rename, never partially written.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("master CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt persisted state: {0}")]
    Corrupt(String),
}
