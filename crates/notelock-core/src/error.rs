use thiserror::Error;

pub type NotelockResult<T> = Result<T, NotelockError>;

#[derive(Debug, Error)]
pub enum NotelockError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrong PIN, corrupted ciphertext, or iv/salt mismatch. One variant for
    /// all authentication failures so callers cannot distinguish the cause.
    #[error("wrong secret")]
    WrongSecret,

    #[error("corrupt envelope: {0}")]
    CorruptEnvelope(String),

    #[error("notes exceed the {limit}-byte soft cap ({actual} bytes)")]
    SizeLimitExceeded { limit: usize, actual: usize },

    #[error("no backup snapshot available for recovery")]
    RecoveryUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NotelockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptEnvelope(msg.into())
    }
}
