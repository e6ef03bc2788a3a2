//! HPO error types

use thiserror::Error;

/// HPO errors
#[derive(Debug, Error)]
pub enum HPOError {
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Invalid parameter value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid range for {name}: [{low}, {high}] (log scale: {log})")]
    InvalidRange {
        name: String,
        low: f64,
        high: f64,
        log: bool,
    },
}

/// Result type for HPO operations
pub type Result<T> = std::result::Result<T, HPOError>;
