use thiserror::Error;

use crate::models::RejectionKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("No input could be obtained from any configured source")]
    NoInput,
}

/// Reasons a cleaned candidate is refused by the validator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("score {score} for {subject} is outside 0-100")]
    ScoreOutOfRange { subject: String, score: f64 },

    #[error("duplicate record id: {0}")]
    DuplicateId(String),
}

impl ValidationError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            ValidationError::MissingField(_) => RejectionKind::MissingField,
            ValidationError::InvalidEmail(_) => RejectionKind::InvalidEmail,
            ValidationError::ScoreOutOfRange { .. } => RejectionKind::ScoreOutOfRange,
            ValidationError::DuplicateId(_) => RejectionKind::DuplicateId,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptFailure(String),

    #[error("decryption failed for record {id}: wrong key or corrupted data")]
    DecryptFailure { id: String },

    #[error("no encrypted record with id {0}")]
    UnknownId(String),

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
