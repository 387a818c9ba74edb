//! Custom error types for clinical-etl

use thiserror::Error;

/// Main error type for clinical-etl operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Required CSV columns are absent
    #[error("missing columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    /// A required field is blank somewhere in the dataset
    #[error("{0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Not initialized: run 'clinical-etl init' first")]
    NotInitialized,

    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for clinical-etl
pub type Result<T> = std::result::Result<T, Error>;
