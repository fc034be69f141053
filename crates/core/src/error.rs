use thiserror::Error;

pub type RotationResult<T> = Result<T, RotationError>;

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("No candidates registered in context: {0}")]
    NoCandidatesInContext(String),

    #[error("Candidate set is empty")]
    EmptyCandidateSet,

    #[error("Ledger lookup failed: {0}")]
    LookupFailed(String),

    #[error("Ledger write failed: {0}")]
    WriteFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
