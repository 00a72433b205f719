use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failure of one ping's detection pass. Never affects the raw location
/// write that precedes it.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("visit state kept conflicting after {0} attempts")]
    Conflict(u32),
    #[error("detection timed out after {0}s")]
    Timeout(u64),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
