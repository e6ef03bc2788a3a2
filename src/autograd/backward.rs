//! Reverse-mode propagation
//!
//! Backward ops build their input gradients out of differentiable ops, so a
//! gradient computed with `create_graph = true` is itself part of the graph
//! and can be differentiated again.

use super::ops::add;
use super::tensor::{no_grad, Tensor};
use crate::error::{Error, Result};
use ndarray::ArrayD;
use std::collections::{BTreeMap, HashMap};

/// Trait for backward operations
pub trait BackwardOp {
    /// Tensors this op consumed, in the order `backward` returns gradients
    fn inputs(&self) -> Vec<Tensor>;

    /// Gradient with respect to each input given the output gradient
    ///
    /// `None` marks an input the op is not differentiable with respect to.
    fn backward(&self, grad_output: &Tensor) -> Vec<Option<Tensor>>;

    /// Name of the op, used for debugging
    fn name(&self) -> &'static str;
}

/// Collect every graph node reachable from `output` keyed by id
fn reachable(output: &Tensor) -> BTreeMap<usize, Tensor> {
    let mut nodes = BTreeMap::new();
    let mut stack = vec![output.clone()];
    while let Some(tensor) = stack.pop() {
        if !tensor.requires_grad() || nodes.contains_key(&tensor.id()) {
            continue;
        }
        if let Some(op) = tensor.backward_op() {
            stack.extend(op.inputs());
        }
        nodes.insert(tensor.id(), tensor);
    }
    nodes
}

/// Propagate `seed` from `output` to every reachable node
///
/// Node ids grow in creation order and every op output is created after its
/// inputs, so descending ids form a reverse topological order.
fn propagate(
    output: &Tensor,
    seed: Tensor,
    create_graph: bool,
) -> Result<(BTreeMap<usize, Tensor>, HashMap<usize, Tensor>)> {
    if !output.requires_grad() {
        return Err(Error::NoGradient(format!(
            "output tensor {} is not part of a graph",
            output.id()
        )));
    }
    let _guard = (!create_graph).then(no_grad);

    let nodes = reachable(output);
    let mut grads: HashMap<usize, Tensor> = HashMap::new();
    grads.insert(output.id(), seed);

    for (id, tensor) in nodes.iter().rev() {
        let Some(op) = tensor.backward_op() else {
            continue;
        };
        let Some(grad_output) = grads.get(id).cloned() else {
            continue;
        };
        for (input, grad) in op.inputs().iter().zip(op.backward(&grad_output)) {
            let Some(grad) = grad else { continue };
            if !input.requires_grad() {
                continue;
            }
            let merged = match grads.remove(&input.id()) {
                Some(existing) => add(&existing, &grad),
                None => grad,
            };
            grads.insert(input.id(), merged);
        }
    }

    Ok((nodes, grads))
}

fn ones_like(tensor: &Tensor) -> Tensor {
    Tensor::constant(ArrayD::ones(tensor.data().raw_dim()))
}

/// Gradients of `output` with respect to `inputs`
///
/// With `create_graph` the returned tensors carry their own graph, enabling
/// gradient-of-gradient. Inputs the output does not depend on receive zeros.
pub fn grad(output: &Tensor, inputs: &[Tensor], create_graph: bool) -> Result<Vec<Tensor>> {
    let (_, mut grads) = propagate(output, ones_like(output), create_graph)?;
    Ok(inputs
        .iter()
        .map(|input| match grads.remove(&input.id()) {
            Some(g) if create_graph => g,
            Some(g) => g.detach(),
            None => Tensor::constant(ArrayD::zeros(input.data().raw_dim())),
        })
        .collect())
}

/// Perform backward pass, accumulating into every reachable leaf
///
/// Interior nodes do not retain gradients.
pub fn backward(output: &Tensor) -> Result<()> {
    backward_with(output, ones_like(output).to_array())
}

/// Perform backward pass seeded with an explicit output gradient
pub fn backward_with(output: &Tensor, grad_output: ArrayD<f32>) -> Result<()> {
    if grad_output.shape() != output.data().shape() {
        return Err(Error::InvalidShape(format!(
            "seed gradient shape {:?} does not match output shape {:?}",
            grad_output.shape(),
            output.shape()
        )));
    }
    let (nodes, grads) = propagate(output, Tensor::constant(grad_output), false)?;
    for (id, tensor) in &nodes {
        if tensor.is_leaf() {
            if let Some(g) = grads.get(id) {
                tensor.accumulate_grad(g.to_array());
            }
        }
    }
    Ok(())
}
