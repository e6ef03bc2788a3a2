//! Matrix multiplication and transpose

use crate::autograd::{BackwardOp, Tensor};
use ndarray::{ArrayD, ArrayView2, Ix2};
use std::rc::Rc;

fn as_matrix(data: &ArrayD<f32>) -> ArrayView2<'_, f32> {
    data.view()
        .into_dimensionality::<Ix2>()
        .unwrap_or_else(|_| panic!("expected a 2-D tensor, got shape {:?}", data.shape()))
}

/// Raw 2-D matrix product without graph recording
pub fn matmul_compute(a: &ArrayD<f32>, b: &ArrayD<f32>) -> ArrayD<f32> {
    as_matrix(a).dot(&as_matrix(b)).into_dyn()
}

/// Matrix multiplication of two 2-D tensors
///
/// # Panics
///
/// Panics if either input is not 2-D or the inner dimensions differ.
pub fn matmul(a: &Tensor, b: &Tensor) -> Tensor {
    let data = matmul_compute(&a.data(), &b.data());
    Tensor::from_op(data, a.requires_grad() || b.requires_grad(), || {
        Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
        })
    })
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
}

impl BackwardOp for MatmulBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        // C = A @ B: ∂L/∂A = ∂L/∂C @ Bᵀ, ∂L/∂B = Aᵀ @ ∂L/∂C
        vec![
            Some(matmul(grad, &transpose(&self.b))),
            Some(matmul(&transpose(&self.a), grad)),
        ]
    }

    fn name(&self) -> &'static str {
        "matmul"
    }
}

/// Transpose a 2-D tensor
pub fn transpose(a: &Tensor) -> Tensor {
    let data = as_matrix(&a.data()).t().as_standard_layout().into_owned().into_dyn();
    Tensor::from_op(data, a.requires_grad(), || {
        Rc::new(TransposeBackward { a: a.clone() })
    })
}

struct TransposeBackward {
    a: Tensor,
}

impl BackwardOp for TransposeBackward {
    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }

    fn backward(&self, grad: &Tensor) -> Vec<Option<Tensor>> {
        vec![Some(transpose(grad))]
    }

    fn name(&self) -> &'static str {
        "transpose"
    }
}
