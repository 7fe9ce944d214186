use thiserror::Error;

/// Error type for validator operations.
///
/// Per-worker call failures are never represented here: a failed or timed-out
/// worker call simply yields no response.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("Reward/worker length mismatch: {rewards} rewards for {workers} workers")]
    LengthMismatch { rewards: usize, workers: usize },

    #[error("Response transform produced {produced} items for {expected} responses")]
    TransformMismatch { expected: usize, produced: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Serialization/Deserialization error: {0}")]
    Serialization(String),

    #[error("Ledger client error: {0}")]
    Ledger(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Query source error: {0}")]
    QuerySource(String),
}

impl From<serde_json::Error> for ValidatorError {
    fn from(err: serde_json::Error) -> Self {
        ValidatorError::Serialization(err.to_string())
    }
}

pub type ValidatorResult<T> = Result<T, ValidatorError>;
