//! Error types for gradient inversion attacks
//!
//! Configuration errors are fatal and never retried. Simulator failures are
//! propagated unchanged to the caller of `run`.

use crate::optim::hpo::HPOError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for invertir operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while preparing or running an attack
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration knob is out of range or missing
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// Candidate and reference gradients have different parameter counts
    #[error("Gradient length mismatch: candidate has {candidate} tensors, reference has {reference}")]
    GradientLengthMismatch { candidate: usize, reference: usize },

    /// Candidate and reference gradient tensors disagree in shape
    #[error("Gradient shape mismatch at parameter {index}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor does not have the shape an operation needs
    #[error("Invalid tensor shape: {0}")]
    InvalidShape(String),

    /// Differentiation was requested through a tensor without gradient tracking
    #[error("Tensor does not require grad: {0}")]
    NoGradient(String),

    /// The training simulator could not replay the client step
    #[error("Training simulation failed: {0}")]
    Simulation(String),

    /// A data loader holds no batches
    #[error("Data loader is empty")]
    EmptyLoader,

    /// The attack loop ran to completion and needs a reset
    #[error("Attack sequence exhausted: call reset() before running again")]
    AttackExhausted,

    /// Hyperparameter sampling failed
    #[error(transparent)]
    Hpo(#[from] HPOError),

    /// Reading a configuration file failed
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parsing a YAML configuration failed
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serializing results failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an [`Error::InvalidConfig`]
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a fatal configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::GradientLengthMismatch { .. }
                | Self::ShapeMismatch { .. }
                | Self::InvalidShape(_)
                | Self::EmptyLoader
                | Self::Yaml(_)
        )
    }
}
