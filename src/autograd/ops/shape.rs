//! Shape operations: broadcast_to, sum_to, reshape, narrow, pad
//!
//! The ops come in adjoint pairs (broadcast_to/sum_to, narrow/pad) so every
//! backward pass stays differentiable.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::rc::Rc;

/// Reduce `data` to `shape` by summing broadcast axes
fn reduce_to(data: &ArrayD<f32>, shape: &[usize]) -> ArrayD<f32> {
    let mut out = data.clone();
    while out.ndim() > shape.len() {
        out = out.sum_axis(Axis(0));
    }
    for (axis, &target) in shape.iter().enumerate() {
        if target == 1 && out.shape()[axis] != 1 {
            out = out.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }
    out
}

/// Broadcast a tensor to a larger shape
///
/// # Panics
///
/// Panics if `a` cannot be broadcast to `shape`.
pub fn broadcast_to(a: &Tensor, shape: &[usize]) -> Tensor {
    if a.shape() == shape {
        return a.clone();
    }
    let data = a
        .data()
        .broadcast(IxDyn(shape))
        .unwrap_or_else(|| panic!("cannot broadcast {:?} to {:?}", a.shape(), shape))
        .to_owned();
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(BroadcastBackward { a: a.clone() })
    })
}

struct BroadcastBackward {
    a: Tensor,
}

impl BackwardOp for BroadcastBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(sum_to(grad, &self.a.shape()))]
    }

    fn name(&self) -> &'static str {
        "broadcast_to"
    }
}

/// Sum a tensor down to a shape it was broadcast from
///
/// Axes of `a` beyond the rank of `shape` are summed away from the front.
pub fn sum_to(a: &Tensor, shape: &[usize]) -> Tensor {
    if a.shape() == shape {
        return a.clone();
    }
    let data = reduce_to(&a.data(), shape);
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(SumToBackward { a: a.clone() })
    })
}

struct SumToBackward {
    a: Tensor,
}

impl BackwardOp for SumToBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(broadcast_to(grad, &self.a.shape()))]
    }

    fn name(&self) -> &'static str {
        "sum_to"
    }
}

/// Reshape a tensor, preserving row-major element order
///
/// # Panics
///
/// Panics if the element counts differ.
pub fn reshape(a: &Tensor, shape: &[usize]) -> Tensor {
    if a.shape() == shape {
        return a.clone();
    }
    let data = a
        .data()
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .unwrap_or_else(|e| panic!("cannot reshape {:?} to {:?}: {e}", a.shape(), shape));
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(ReshapeBackward { a: a.clone() })
    })
}

struct ReshapeBackward {
    a: Tensor,
}

impl BackwardOp for ReshapeBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(reshape(grad, &self.a.shape()))]
    }

    fn name(&self) -> &'static str {
        "reshape"
    }
}

/// Slice `len` elements starting at `start` along `axis`
///
/// # Panics
///
/// Panics if `axis` is out of range or `start + len` exceeds its length.
pub fn narrow(a: &Tensor, axis: usize, start: usize, len: usize) -> Tensor {
    let data = a
        .data()
        .slice_axis(Axis(axis), Slice::from(start..start + len))
        .to_owned();
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(NarrowBackward {
            a: a.clone(),
            axis,
            start,
        })
    })
}

struct NarrowBackward {
    a: Tensor,
    axis: usize,
    start: usize,
}

impl BackwardOp for NarrowBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        let full = self.a.shape()[self.axis];
        vec![Some(pad(grad, self.axis, self.start, full))]
    }

    fn name(&self) -> &'static str {
        "narrow"
    }
}

/// Embed `a` into zeros of length `full` along `axis`, starting at `start`
///
/// # Panics
///
/// Panics if `axis` is out of range or `start + a.shape()[axis]` exceeds `full`.
pub fn pad(a: &Tensor, axis: usize, start: usize, full: usize) -> Tensor {
    let len = a.shape()[axis];
    let mut shape = a.shape();
    shape[axis] = full;
    let mut data = ArrayD::zeros(IxDyn(&shape));
    data.slice_axis_mut(Axis(axis), Slice::from(start..start + len))
        .assign(&*a.data());
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(PadBackward {
            a: a.clone(),
            axis,
            start,
        })
    })
}

struct PadBackward {
    a: Tensor,
    axis: usize,
    start: usize,
}

impl BackwardOp for PadBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        let len = self.a.shape()[self.axis];
        vec![Some(narrow(grad, self.axis, self.start, len))]
    }

    fn name(&self) -> &'static str {
        "pad"
    }
}
