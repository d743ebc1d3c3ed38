use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type InsightsResult<T> = Result<T, InsightsError>;
