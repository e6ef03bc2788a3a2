//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms acting on leaf tensors in place
///
/// Tensors are handles, so updating a parameter through `params` is visible
/// to every other clone of it (for example a reconstruction data loader).
pub trait Optimizer {
    /// Perform a single optimization step using the accumulated gradients
    fn step(&mut self, params: &[Tensor]);

    /// Release all gradients
    fn zero_grad(&mut self, params: &[Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Name of the optimizer
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    /// Minimal optimizer implementation for testing default trait methods
    struct TestOptimizer {
        learning_rate: f32,
    }

    impl Optimizer for TestOptimizer {
        fn step(&mut self, params: &[Tensor]) {
            for param in params {
                if let Some(grad) = param.grad() {
                    let mut data = param.data_mut();
                    data.scaled_add(-self.learning_rate, &grad);
                }
            }
        }

        fn lr(&self) -> f32 {
            self.learning_rate
        }

        fn set_lr(&mut self, lr: f32) {
            self.learning_rate = lr;
        }

        fn name(&self) -> &'static str {
            "test"
        }
    }

    #[test]
    fn test_optimizer_step_updates_shared_handles() {
        let mut opt = TestOptimizer { learning_rate: 0.1 };
        let param = Tensor::from_vec(vec![1.0, 2.0], true);
        let alias = param.clone();
        param.set_grad(arr1(&[0.5, 1.0]).into_dyn());

        opt.step(&[param]);

        let data = alias.data();
        assert!((data[[0]] - 0.95).abs() < 1e-6);
        assert!((data[[1]] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_optimizer_zero_grad() {
        let mut opt = TestOptimizer { learning_rate: 0.1 };
        let params = vec![
            Tensor::from_vec(vec![1.0, 2.0], true),
            Tensor::from_vec(vec![3.0, 4.0], true),
        ];
        for p in &params {
            p.set_grad(arr1(&[0.5, 1.0]).into_dyn());
        }

        opt.zero_grad(&params);
        assert!(params.iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_optimizer_set_lr() {
        let mut opt = TestOptimizer { learning_rate: 0.1 };
        assert_eq!(opt.lr(), 0.1);

        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
    }
}
