//! Differentiable client losses
//!
//! - [`CrossEntropyLoss`] - softmax cross entropy over one-hot or soft targets
//! - [`MseLoss`] - mean squared error for regression heads
//!
//! Both are composed from autograd ops, so the simulator can differentiate
//! the gradient they produce a second time.

use crate::autograd::{broadcast_to, exp, log, mul, scale, square, sub, sum, sum_to};
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{Array2, ArrayD, Axis};

/// Loss function usable inside a meta-differentiable training step
pub trait MetaLoss {
    /// Scalar loss of `outputs` against `targets`
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor>;

    /// Name of the loss function
    fn name(&self) -> &'static str;
}

fn check_same_shape(outputs: &Tensor, targets: &Tensor) -> Result<()> {
    if outputs.shape() != targets.shape() {
        return Err(Error::InvalidShape(format!(
            "outputs {:?} and targets {:?} must have the same shape",
            outputs.shape(),
            targets.shape()
        )));
    }
    Ok(())
}

/// One-hot encode class labels into a `[labels.len(), classes]` tensor
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Tensor> {
    let mut data = Array2::<f32>::zeros((labels.len(), classes));
    for (row, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(Error::InvalidShape(format!(
                "label {label} out of range for {classes} classes"
            )));
        }
        data[[row, label]] = 1.0;
    }
    Ok(Tensor::constant(data.into_dyn()))
}

/// Cross Entropy Loss (for classification)
///
/// L = -mean_b(sum_c(targets * log_softmax(logits)))
///
/// # Example
///
/// ```
/// use invertir::fl::{one_hot, CrossEntropyLoss, MetaLoss};
/// use invertir::Tensor;
///
/// let logits = Tensor::from_shape_vec(&[1, 3], vec![2.0, 1.0, 0.5], true).unwrap();
/// let targets = one_hot(&[0], 3).unwrap();
/// let loss = CrossEntropyLoss.forward(&logits, &targets).unwrap();
/// assert!(loss.item() > 0.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl MetaLoss for CrossEntropyLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        check_same_shape(outputs, targets)?;
        let shape = outputs.shape();
        if shape.len() != 2 || shape[0] == 0 {
            return Err(Error::InvalidShape(format!(
                "cross entropy expects [batch, classes] logits, got {shape:?}"
            )));
        }
        let batch = shape[0];

        // Row max as a constant keeps exp() finite without changing the gradient
        let max: ArrayD<f32> = outputs
            .data()
            .fold_axis(Axis(1), f32::NEG_INFINITY, |&a, &b| a.max(b))
            .insert_axis(Axis(1));
        let shifted = sub(outputs, &broadcast_to(&Tensor::constant(max), &shape));

        let log_norm = log(&sum_to(&exp(&shifted), &[batch, 1]));
        let log_probs = sub(&shifted, &broadcast_to(&log_norm, &shape));
        Ok(scale(&sum(&mul(targets, &log_probs)), -1.0 / batch as f32))
    }

    fn name(&self) -> &'static str {
        "CrossEntropy"
    }
}

/// Mean Squared Error Loss
///
/// L = mean((outputs - targets)^2)
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl MetaLoss for MseLoss {
    fn forward(&self, outputs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        check_same_shape(outputs, targets)?;
        if outputs.is_empty() {
            return Err(Error::InvalidShape("MSE of an empty tensor".to_string()));
        }
        let n = outputs.len() as f32;
        Ok(scale(&sum(&square(&sub(outputs, targets))), 1.0 / n))
    }

    fn name(&self) -> &'static str {
        "MSE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, grad};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_loss_names() {
        assert_eq!(CrossEntropyLoss.name(), "CrossEntropy");
        assert_eq!(MseLoss.name(), "MSE");
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let logits = Tensor::zeros(&[2, 4], true);
        let targets = one_hot(&[1, 3], 4).unwrap();
        let loss = CrossEntropyLoss.forward(&logits, &targets).unwrap();
        assert_abs_diff_eq!(loss.item(), 4.0_f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_gradient_is_probs_minus_targets() {
        let logits = Tensor::from_shape_vec(&[1, 3], vec![2.0, 1.0, 0.5], true).unwrap();
        let targets = one_hot(&[0], 3).unwrap();
        let loss = CrossEntropyLoss.forward(&logits, &targets).unwrap();
        backward(&loss).unwrap();

        let exps = [2.0_f32.exp(), 1.0_f32.exp(), 0.5_f32.exp()];
        let total: f32 = exps.iter().sum();
        let g = logits.grad().unwrap();
        assert_abs_diff_eq!(g[[0, 0]], exps[0] / total - 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(g[[0, 1]], exps[1] / total, epsilon = 1e-5);
        assert_abs_diff_eq!(g[[0, 2]], exps[2] / total, epsilon = 1e-5);
    }

    #[test]
    fn test_cross_entropy_large_logits_stay_finite() {
        let logits = Tensor::from_shape_vec(&[1, 2], vec![1000.0, 0.0], true).unwrap();
        let targets = one_hot(&[1], 2).unwrap();
        let loss = CrossEntropyLoss.forward(&logits, &targets).unwrap();
        assert_abs_diff_eq!(loss.item(), 1000.0, epsilon = 1e-2);
    }

    #[test]
    fn test_cross_entropy_is_twice_differentiable() {
        let logits = Tensor::from_shape_vec(&[1, 2], vec![0.3, -0.2], true).unwrap();
        let targets = one_hot(&[0], 2).unwrap();
        let loss = CrossEntropyLoss.forward(&logits, &targets).unwrap();
        let g = grad(&loss, &[logits.clone()], true).unwrap().remove(0);
        assert!(g.requires_grad());
        // d/dz0 (p0 - 1) = p0 (1 - p0) > 0
        backward(&sum(&mul(&g, &Tensor::from_shape_vec(&[1, 2], vec![1.0, 0.0], false).unwrap())))
            .unwrap();
        assert!(logits.grad().unwrap()[[0, 0]] > 0.0);
    }

    #[test]
    fn test_cross_entropy_rejects_shape_mismatch() {
        let logits = Tensor::zeros(&[2, 3], true);
        let targets = one_hot(&[0], 3).unwrap();
        assert!(CrossEntropyLoss.forward(&logits, &targets).is_err());
    }

    #[test]
    fn test_one_hot_rejects_out_of_range() {
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn test_mse() {
        let pred = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let target = Tensor::from_vec(vec![1.5, 2.5, 3.5], false);
        let loss = MseLoss.forward(&pred, &target).unwrap();
        assert_abs_diff_eq!(loss.item(), 0.25, epsilon = 1e-6);
        backward(&loss).unwrap();
        assert_abs_diff_eq!(pred.grad().unwrap()[[0]], -1.0 / 3.0, epsilon = 1e-6);
    }
}
