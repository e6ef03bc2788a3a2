//! Autograd operations with backward passes
//!
//! Every backward pass is composed of the differentiable operations in this
//! module, which is what makes gradient-of-gradient work.

mod activations;
mod basic;
mod matmul;
mod shape;

// Re-export all public operations
pub use activations::{abs, exp, log, relu, sign, sqrt, square};
pub use basic::{add, add_scalar, div, mul, neg, scale, sub, sum};
pub use matmul::{matmul, matmul_compute, transpose};
pub use shape::{broadcast_to, narrow, pad, reshape, sum_to};
