//! Optimizers for the reconstruction candidate

mod adam;
pub mod hpo;
mod optimizer;
mod scheduler;
mod sgd;

pub use adam::Adam;
pub use hpo::{FixedTrial, HPOError, HyperparameterTrial, RandomTrial};
pub use optimizer::Optimizer;
pub use scheduler::{ConstantLR, LRScheduler, MultiStepLR, StepDecayLR};
pub use sgd::SGD;
