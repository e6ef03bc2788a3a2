//! Meta-optimizers: update rules expressed as differentiable ops
//!
//! A meta-optimizer returns new parameter tensors instead of mutating the
//! old ones, so the updated parameters stay connected to everything the
//! gradient depended on.

use crate::autograd::{scale, sub};
use crate::error::{Error, Result};
use crate::Tensor;

/// Differentiable inner-loop optimizer
pub trait MetaOptimizer {
    /// Parameters after one step along `grads`
    fn step(&self, params: &[Tensor], grads: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Learning rate
    fn lr(&self) -> f32;

    /// Name of the optimizer
    fn name(&self) -> &'static str;
}

/// Plain gradient descent, `p' = p - lr * g`
#[derive(Debug, Clone, Copy)]
pub struct MetaSgd {
    lr: f32,
}

impl MetaSgd {
    /// Create a meta-SGD optimizer
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }
}

impl Default for MetaSgd {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl MetaOptimizer for MetaSgd {
    fn step(&self, params: &[Tensor], grads: &[Tensor]) -> Result<Vec<Tensor>> {
        if params.len() != grads.len() {
            return Err(Error::GradientLengthMismatch {
                candidate: grads.len(),
                reference: params.len(),
            });
        }
        params
            .iter()
            .zip(grads)
            .enumerate()
            .map(|(index, (p, g))| {
                if p.shape() != g.shape() {
                    return Err(Error::ShapeMismatch {
                        index,
                        expected: p.shape(),
                        actual: g.shape(),
                    });
                }
                Ok(sub(p, &scale(g, self.lr)))
            })
            .collect()
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn name(&self) -> &'static str {
        "MetaSGD"
    }
}
