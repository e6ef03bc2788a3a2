//! Hyperparameter trial interface
//!
//! An outer tuning loop hands an attack a [`HyperparameterTrial`]; the attack
//! draws the knobs it wants searched and stores them in its configuration.
//!
//! # Example
//!
//! ```
//! use invertir::optim::hpo::{HyperparameterTrial, RandomTrial};
//!
//! let mut trial = RandomTrial::new(0, 42);
//! let tv = trial.suggest_float("total_variation", 1e-6, 1e-1, true).unwrap();
//! assert!((1e-6..=1e-1).contains(&tv));
//! ```

mod error;
mod sampler;
mod types;

pub use error::{HPOError, Result};
pub use sampler::{FixedTrial, HyperparameterTrial, RandomTrial};
pub use types::{ParameterDomain, ParameterValue, Trial};
