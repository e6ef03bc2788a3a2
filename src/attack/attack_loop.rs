//! Generic reconstruction loop
//!
//! [`ReconstructionLoop`] is a pull-based iterator: every call to `next`
//! runs one full attack iteration and hands back its [`AttackStep`]. Nothing
//! is computed ahead of the consumer.

use super::config::{InvertingConfig, InvertingParams, Modality};
use super::regularizer::median_pool2d;
use super::results::{mse, psnr, AttackStep, BestReconstruction, GiaResults};
use crate::data::{CandidateBatch, DataLoader, Normalization};
use crate::error::Result;
use crate::fl::{MetaModel, TrainingSimulator};
use crate::optim::{LRScheduler, Optimizer};
use crate::Tensor;
use ndarray::ArrayD;
use tracing::{debug, info};

/// Lifecycle state of an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackState {
    /// Reference gradient and candidate are ready
    Prepared,
    /// A reconstruction loop is borrowing the attack
    Running,
    /// The loop ran out or failed; `reset` is required
    Idle,
}

/// Everything a step function reads
///
/// The knobs are a copy taken when the loop started.
pub struct StepContext<'a> {
    pub model: &'a dyn MetaModel,
    pub simulator: &'a dyn TrainingSimulator,
    pub config: &'a InvertingConfig,
    pub params: InvertingParams,
    pub client_gradient: &'a [Tensor],
    pub candidate: &'a CandidateBatch,
    pub reconstruction_loader: &'a DataLoader,
}

impl StepContext<'_> {
    /// Release candidate and model gradients
    pub fn zero_grad(&self) {
        self.candidate.zero_grad();
        self.model.zero_grad();
    }

    /// Client update the current candidate would produce, with its graph
    pub fn candidate_gradient(&self) -> Result<Vec<Tensor>> {
        self.simulator.train(
            self.model,
            self.reconstruction_loader,
            self.config.optimizer(),
            self.config.criterion(),
            self.params.epochs,
        )
    }
}

/// Per-iteration step: compute the loss and leave the candidate gradient set
pub type StepFn = fn(&StepContext<'_>) -> Result<Tensor>;

/// Inputs of [`ReconstructionLoop::new`]
pub struct LoopInputs<'a> {
    pub context: StepContext<'a>,
    pub step_fn: StepFn,
    pub client_loader: &'a DataLoader,
    pub normalization: &'a Normalization,
    pub best: &'a mut BestReconstruction,
    pub state: &'a mut AttackState,
}

/// Iterator over exactly `at_iterations` attack steps
pub struct ReconstructionLoop<'a> {
    context: StepContext<'a>,
    step_fn: StepFn,
    client_data: Vec<ArrayD<f32>>,
    normalization: &'a Normalization,
    best: &'a mut BestReconstruction,
    state: &'a mut AttackState,
    optimizer: Box<dyn Optimizer>,
    scheduler: Box<dyn LRScheduler>,
    iteration: usize,
    finished: bool,
}

impl<'a> ReconstructionLoop<'a> {
    /// Start a run; marks the attack as running
    pub fn new(inputs: LoopInputs<'a>) -> Result<Self> {
        let LoopInputs {
            context,
            step_fn,
            client_loader,
            normalization,
            best,
            state,
        } = inputs;
        let params = &context.params;
        let client_data = client_loader
            .iter()
            .map(|batch| normalization.denormalize(&batch.inputs.data()))
            .collect::<Result<Vec<_>>>()?;
        let optimizer = params.attack_optimizer.build(params.attack_lr);
        let scheduler = params.lr_schedule.build(params.attack_lr, params.at_iterations);

        info!(
            iterations = params.at_iterations,
            modality = ?params.modality,
            optimizer = optimizer.name(),
            "starting reconstruction"
        );
        *state = AttackState::Running;

        Ok(Self {
            context,
            step_fn,
            client_data,
            normalization,
            best,
            state,
            optimizer,
            scheduler,
            iteration: 0,
            finished: false,
        })
    }

    /// Iterations completed so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Total number of items the loop yields
    pub fn total(&self) -> usize {
        self.context.params.at_iterations
    }

    /// Knobs this run uses
    pub fn params(&self) -> &InvertingParams {
        &self.context.params
    }

    /// Gradients left on the candidate by the latest step
    pub fn candidate_gradients(&self) -> Vec<Option<ArrayD<f32>>> {
        self.context.candidate.gradients()
    }

    /// Best record so far
    pub fn best(&self) -> &BestReconstruction {
        self.best
    }

    fn denormalized(&self) -> Result<Vec<ArrayD<f32>>> {
        self.context
            .candidate
            .tensors()
            .iter()
            .map(|t| self.normalization.denormalize(&t.data()))
            .collect()
    }

    /// Image priors applied to the candidate after the optimizer step
    fn post_process(&self, iteration: usize) -> Result<()> {
        let params = &self.context.params;
        let pool = params.median_pooling && (iteration + 1) % params.median_pool_interval == 0;
        for tensor in self.context.candidate.tensors() {
            if params.clamp_to_data_range {
                self.normalization.clamp_in_place(&mut tensor.data_mut())?;
            }
            if pool {
                let pooled = median_pool2d(&tensor.data())?;
                *tensor.data_mut() = pooled;
            }
        }
        Ok(())
    }

    fn step(&mut self, iteration: usize) -> Result<AttackStep> {
        let learning_rate = self.scheduler.get_lr();
        self.scheduler.apply(self.optimizer.as_mut());

        let loss = (self.step_fn)(&self.context)?.item();

        // The candidate that produced `loss` is the one recorded
        let improved = {
            let normalization = self.normalization;
            let candidate = self.context.candidate;
            self.best.update(loss, iteration, || {
                candidate
                    .tensors()
                    .iter()
                    .map(|t| normalization.denormalize(&t.data()))
                    .collect()
            })?
        };

        self.optimizer.step(self.context.candidate.tensors());
        if self.context.params.modality == Modality::Image {
            self.post_process(iteration)?;
        }

        let snapshot = self.denormalized()?;
        let error = self
            .best
            .snapshot()
            .and_then(|best| mse(&self.client_data, best));
        let result = GiaResults {
            iteration,
            loss,
            best_loss: self.best.loss(),
            best_iteration: self.best.iteration(),
            learning_rate,
            mse: error,
            psnr: match self.context.params.modality {
                Modality::Image => error.map(psnr),
                Modality::Text => None,
            },
        };

        if iteration % self.context.params.log_interval == 0 {
            debug!(
                iteration,
                loss,
                best_loss = result.best_loss,
                learning_rate,
                improved,
                "attack progress"
            );
        }

        self.scheduler.step();
        Ok(AttackStep {
            iteration,
            snapshot,
            result,
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        *self.state = AttackState::Idle;
        info!(
            iterations = self.iteration,
            best_loss = self.best.loss(),
            best_iteration = ?self.best.iteration(),
            "reconstruction finished"
        );
    }
}

impl Iterator for ReconstructionLoop<'_> {
    type Item = Result<AttackStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let iteration = self.iteration;
        match self.step(iteration) {
            Ok(step) => {
                self.iteration += 1;
                if self.iteration >= self.total() {
                    self.finish();
                }
                Some(Ok(step))
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.finished {
            return (0, Some(0));
        }
        let remaining = self.total() - self.iteration;
        (0, Some(remaining))
    }
}

impl Drop for ReconstructionLoop<'_> {
    fn drop(&mut self) {
        self.optimizer.zero_grad(self.context.candidate.tensors());
        self.context.model.zero_grad();
        if !self.finished {
            debug!(iteration = self.iteration, "reconstruction stopped early");
            *self.state = AttackState::Prepared;
        }
    }
}
