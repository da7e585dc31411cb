//! Error types for the visualdata pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, VisualdataError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum VisualdataError {
    /// Malformed, empty, or unsupported input file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid or inapplicable cleaning policy
    #[error("Cleaning error: {0}")]
    CleaningError(String),

    /// Invalid reduction method, parameters, or column references
    #[error("Reduction error: {0}")]
    ReductionError(String),

    /// Render or database persistence failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Target table already exists under the `fail` policy
    #[error("Conflict error: {0}")]
    ConflictError(String),

    /// Column sets incompatible under the `append` policy
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Invalid operation options
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for VisualdataError {
    fn from(err: rusqlite::Error) -> Self {
        VisualdataError::StorageError(err.to_string())
    }
}
