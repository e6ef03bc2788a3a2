//! Invertir: gradient inversion attacks against federated learning
//!
//! A federated client shares a model update instead of its data. This crate
//! measures how much that update leaks by rebuilding the data from it.
//!
//! # Modules
//!
//! - [`autograd`]: tensors with higher-order reverse-mode differentiation
//! - [`fl`]: differentiable models, losses and client-training simulators
//! - [`data`]: loaders, normalization and candidate initialization
//! - [`optim`]: optimizers and schedules for the candidate, tuning trials
//! - [`attack`]: the Inverting Gradients attack and its reconstruction loop
//!
//! Progress is reported through [`tracing`]; install a subscriber to see it.

pub mod attack;
pub mod autograd;
pub mod data;
pub mod error;
pub mod fl;
pub mod optim;

pub use autograd::Tensor;
pub use error::{Error, Result};
