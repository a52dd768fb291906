use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("rule '{0}' not found")]
    NotFound(String),
    #[error("priority must be between 1 and 4, got {0}")]
    InvalidPriority(u8),
    #[error("status must be valid, warning or error, got '{0}'")]
    InvalidStatus(String),
    #[error("weight must be between 0 and 10, got {0}")]
    InvalidWeight(f64),
    #[error("rule text cannot be empty")]
    EmptyRule,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
