//! Graph-based autograd engine with higher-order gradients
//!
//! Tensors are reference-counted handles; each op records a [`BackwardOp`]
//! holding its inputs. [`grad`] walks the graph in reverse creation order.
//! With `create_graph = true` the returned gradients are themselves graph
//! nodes, which lets a training step run inside an outer differentiation.
//!
//! ```
//! use invertir::autograd::{backward, grad, mul, sum, Tensor};
//!
//! let w = Tensor::from_vec(vec![2.0], true);
//! let x = Tensor::from_vec(vec![3.0], true);
//! // y = w * x², ∂y/∂w = x²
//! let y = sum(&mul(&w, &mul(&x, &x)));
//! let dw = grad(&y, &[w.clone()], true).unwrap().remove(0);
//! // ∂(∂y/∂w)/∂x = 2x
//! backward(&sum(&dw)).unwrap();
//! assert_eq!(x.grad().unwrap()[[0]], 6.0);
//! ```

mod backward;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::{backward, backward_with, grad, BackwardOp};
pub use ops::*;
pub use tensor::{is_grad_enabled, no_grad, NoGradGuard, Tensor};
