//! Element-wise autograd operations: relu, abs, exp, log, sqrt

use super::basic::{div, mul, scale};
use crate::autograd::{BackwardOp, Tensor};
use ndarray::ArrayD;
use std::rc::Rc;

/// Sign with `sign(0) = 0`, unlike `f32::signum`
pub fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn mask(data: &ArrayD<f32>, f: impl Fn(f32) -> f32) -> Tensor {
    Tensor::constant(data.mapv(f))
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    Tensor::from_op(data, a.requires_grad(), || Rc::new(ReluBackward { a: a.clone() }))
}

struct ReluBackward {
    a: Tensor,
}

impl BackwardOp for ReluBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // ∂L/∂a = ∂L/∂out * (a > 0)
        let gate = mask(&self.a.data(), |x| if x > 0.0 { 1.0 } else { 0.0 });
        vec![Some(mul(grad, &gate))]
    }

    fn name(&self) -> &'static str {
        "relu"
    }
}

/// Absolute value
pub fn abs(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::abs);
    Tensor::from_op(data, a.requires_grad(), || Rc::new(AbsBackward { a: a.clone() }))
}

struct AbsBackward {
    a: Tensor,
}

impl BackwardOp for AbsBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        let signs = mask(&self.a.data(), sign);
        vec![Some(mul(grad, &signs))]
    }

    fn name(&self) -> &'static str {
        "abs"
    }
}

/// Natural exponential
pub fn exp(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::exp);
    Tensor::from_op(data, a.requires_grad(), || Rc::new(ExpBackward { a: a.clone() }))
}

struct ExpBackward {
    a: Tensor,
}

impl BackwardOp for ExpBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // Recomputed rather than captured: the output cannot own itself
        vec![Some(mul(grad, &exp(&self.a)))]
    }

    fn name(&self) -> &'static str {
        "exp"
    }
}

/// Natural logarithm
pub fn log(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::ln);
    Tensor::from_op(data, a.requires_grad(), || Rc::new(LogBackward { a: a.clone() }))
}

struct LogBackward {
    a: Tensor,
}

impl BackwardOp for LogBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(div(grad, &self.a))]
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Square root
pub fn sqrt(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::sqrt);
    Tensor::from_op(data, a.requires_grad(), || Rc::new(SqrtBackward { a: a.clone() }))
}

struct SqrtBackward {
    a: Tensor,
}

impl BackwardOp for SqrtBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // ∂√a/∂a = 1 / (2√a)
        vec![Some(div(grad, &scale(&sqrt(&self.a), 2.0)))]
    }

    fn name(&self) -> &'static str {
        "sqrt"
    }
}

/// Element-wise square
pub fn square(a: &Tensor) -> Tensor {
    mul(a, a)
}
