//! Adam optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::{ArrayD, Zip};

/// Adam optimizer
///
/// m_t = β₁ m_{t-1} + (1 - β₁) g
/// v_t = β₂ v_{t-1} + (1 - β₂) g²
/// θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε), lr_t = lr √(1 - β₂ᵗ) / (1 - β₁ᵗ)
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<ArrayD<f32>>>, // First moment
    v: Vec<Option<ArrayD<f32>>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Create Adam with default parameters (β₁ = 0.9, β₂ = 0.999, ε = 1e-8)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|_| None).collect();
            self.v = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &[Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction folded into the step size
        let lr_t = self.lr * (1.0 - self.beta2.powi(self.t as i32)).sqrt()
            / (1.0 - self.beta1.powi(self.t as i32));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for (i, param) in params.iter().enumerate() {
            let Some(grad) = param.grad() else { continue };
            let m = self.m[i].get_or_insert_with(|| ArrayD::zeros(grad.raw_dim()));
            let v = self.v[i].get_or_insert_with(|| ArrayD::zeros(grad.raw_dim()));
            let mut data = param.data_mut();

            Zip::from(&mut *data)
                .and(m)
                .and(v)
                .and(&grad)
                .for_each(|p, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr_t * *m / (v.sqrt() + epsilon);
                });
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}
