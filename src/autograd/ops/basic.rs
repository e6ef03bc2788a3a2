//! Basic autograd operations: add, sub, mul, div, neg, scale, sum
//!
//! Binary ops follow numpy broadcasting; the backward pass reduces each
//! gradient back to its input shape with [`sum_to`].

use super::shape::{broadcast_to, sum_to};
use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, IxDyn};
use std::rc::Rc;

/// Add two tensors
///
/// # Panics
///
/// Panics if the shapes of `a` and `b` do not broadcast together.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = &*a.data() + &*b.data();
    Tensor::from_op(data, a.requires_grad() || b.requires_grad(), || {
        Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
        })
    })
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
}

impl BackwardOp for AddBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![
            Some(sum_to(grad, &self.a.shape())),
            Some(sum_to(grad, &self.b.shape())),
        ]
    }

    fn name(&self) -> &'static str {
        "add"
    }
}

/// Subtract `b` from `a`
///
/// # Panics
///
/// Panics if the shapes of `a` and `b` do not broadcast together.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    let data = &*a.data() - &*b.data();
    Tensor::from_op(data, a.requires_grad() || b.requires_grad(), || {
        Rc::new(SubBackward {
            a: a.clone(),
            b: b.clone(),
        })
    })
}

struct SubBackward {
    a: Tensor,
    b: Tensor,
}

impl BackwardOp for SubBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![
            Some(sum_to(grad, &self.a.shape())),
            Some(neg(&sum_to(grad, &self.b.shape()))),
        ]
    }

    fn name(&self) -> &'static str {
        "sub"
    }
}

/// Multiply two tensors element-wise
///
/// # Panics
///
/// Panics if the shapes of `a` and `b` do not broadcast together.
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    let data = &*a.data() * &*b.data();
    Tensor::from_op(data, a.requires_grad() || b.requires_grad(), || {
        Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
        })
    })
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
}

impl BackwardOp for MulBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // ∂L/∂a = ∂L/∂out * b, ∂L/∂b = ∂L/∂out * a
        vec![
            Some(sum_to(&mul(grad, &self.b), &self.a.shape())),
            Some(sum_to(&mul(grad, &self.a), &self.b.shape())),
        ]
    }

    fn name(&self) -> &'static str {
        "mul"
    }
}

/// Divide `a` by `b` element-wise
///
/// # Panics
///
/// Panics if the shapes of `a` and `b` do not broadcast together.
pub fn div(a: &Tensor, b: &Tensor) -> Tensor {
    let data = &*a.data() / &*b.data();
    Tensor::from_op(data, a.requires_grad() || b.requires_grad(), || {
        Rc::new(DivBackward {
            a: a.clone(),
            b: b.clone(),
        })
    })
}

struct DivBackward {
    a: Tensor,
    b: Tensor,
}

impl BackwardOp for DivBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // ∂L/∂a = g / b, ∂L/∂b = -g * a / b²
        let grad_a = div(grad, &self.b);
        let grad_b = neg(&div(&mul(grad, &self.a), &mul(&self.b, &self.b)));
        vec![
            Some(sum_to(&grad_a, &self.a.shape())),
            Some(sum_to(&grad_b, &self.b.shape())),
        ]
    }

    fn name(&self) -> &'static str {
        "div"
    }
}

/// Negate a tensor
pub fn neg(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| -x);
    Tensor::from_op(data, a.requires_grad(), || Rc::new(NegBackward { a: a.clone() }))
}

struct NegBackward {
    a: Tensor,
}

impl BackwardOp for NegBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(neg(grad))]
    }

    fn name(&self) -> &'static str {
        "neg"
    }
}

/// Scale tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data().mapv(|x| x * factor);
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
        })
    })
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
}

impl BackwardOp for ScaleBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(scale(grad, self.factor))]
    }

    fn name(&self) -> &'static str {
        "scale"
    }
}

/// Add a constant to every element
pub fn add_scalar(a: &Tensor, value: f32) -> Tensor {
    let data = a.data().mapv(|x| x + value);
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(AddScalarBackward { a: a.clone() })
    })
}

struct AddScalarBackward {
    a: Tensor,
}

impl BackwardOp for AddScalarBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(grad.clone())]
    }

    fn name(&self) -> &'static str {
        "add_scalar"
    }
}

/// Sum all elements into a 0-D tensor
pub fn sum(a: &Tensor) -> Tensor {
    let data = ArrayD::from_elem(IxDyn(&[]), a.data().sum());
    Tensor::from_op(data, a.requires_grad(), || Rc::new(SumBackward { a: a.clone() }))
}

struct SumBackward {
    a: Tensor,
}

impl BackwardOp for SumBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(broadcast_to(grad, &self.a.shape()))]
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}
