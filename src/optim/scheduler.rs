//! Learning rate schedulers
//!
//! Provides learning rate scheduling strategies for the attack optimizer:
//! - `ConstantLR` - No decay
//! - `StepDecayLR` - Step decay by factor every N steps
//! - `MultiStepLR` - Decay by factor at fixed milestones

use super::Optimizer;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Step the scheduler (called after each optimizer step)
    fn step(&mut self);

    /// Apply the current learning rate to an optimizer
    fn apply(&self, optimizer: &mut dyn Optimizer) {
        optimizer.set_lr(self.get_lr());
    }
}

/// Constant learning rate
pub struct ConstantLR {
    lr: f32,
}

impl ConstantLR {
    /// Create a scheduler that never changes the learning rate
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }
}

impl LRScheduler for ConstantLR {
    fn get_lr(&self) -> f32 {
        self.lr
    }

    fn step(&mut self) {}
}

/// Step Decay Learning Rate Scheduler
///
/// Multiplies the learning rate by `gamma` every `step_size` steps.
pub struct StepDecayLR {
    lr_initial: f32,
    gamma: f32,
    step_size: usize,
    current_step: usize,
}

impl StepDecayLR {
    /// Create a new step decay scheduler
    ///
    /// # Arguments
    /// * `lr_initial` - Initial learning rate
    /// * `step_size` - Decay LR every step_size steps
    /// * `gamma` - Multiplicative factor (e.g., 0.1 for 10x reduction)
    pub fn new(lr_initial: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            lr_initial,
            gamma,
            step_size,
            current_step: 0,
        }
    }
}

impl LRScheduler for StepDecayLR {
    fn get_lr(&self) -> f32 {
        if self.step_size == 0 {
            return self.lr_initial;
        }
        let num_decays = self.current_step / self.step_size;
        self.lr_initial * self.gamma.powi(num_decays as i32)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }
}

/// Multi-Step Learning Rate Scheduler
///
/// Multiplies the learning rate by `gamma` once for every milestone the step
/// counter has reached.
pub struct MultiStepLR {
    lr_initial: f32,
    gamma: f32,
    milestones: Vec<usize>,
    current_step: usize,
}

impl MultiStepLR {
    /// Create a scheduler with absolute step milestones
    pub fn new(lr_initial: f32, mut milestones: Vec<usize>, gamma: f32) -> Self {
        milestones.sort_unstable();
        Self {
            lr_initial,
            gamma,
            milestones,
            current_step: 0,
        }
    }

    /// Create a scheduler whose milestones are fractions of `total_steps`
    pub fn from_fractions(lr_initial: f32, total_steps: usize, fractions: &[f32], gamma: f32) -> Self {
        let milestones = fractions
            .iter()
            .map(|f| (total_steps as f32 * f).floor() as usize)
            .collect();
        Self::new(lr_initial, milestones, gamma)
    }

    /// Milestones in ascending order
    pub fn milestones(&self) -> &[usize] {
        &self.milestones
    }
}

impl LRScheduler for MultiStepLR {
    fn get_lr(&self) -> f32 {
        let passed = self
            .milestones
            .iter()
            .filter(|&&m| m <= self.current_step)
            .count();
        self.lr_initial * self.gamma.powi(passed as i32)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }
}
