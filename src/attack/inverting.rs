//! Inverting Gradients (Geiping et al., NeurIPS 2020)
//!
//! Image candidates are matched by cosine distance under a total-variation
//! prior and moved with sign-gradient steps. Text candidates are matched by
//! L2 distance under a negative-range penalty and keep their raw gradient.

use super::attack_loop::{AttackState, LoopInputs, ReconstructionLoop, StepContext, StepFn};
use super::config::{InvertingConfig, InvertingParams, Modality};
use super::regularizer::{negative_range_penalty, total_variation};
use super::results::BestReconstruction;
use super::similarity::{cosine_similarity_weights, l2_distance};
use crate::autograd::{add, backward, scale, sign};
use crate::data::{used_tokens, CandidateBatch, DataLoader, Normalization};
use crate::error::{Error, Result};
use crate::fl::{MetaModel, TrainingSimulator};
use crate::optim::hpo::HyperparameterTrial;
use crate::Tensor;
use serde::Serialize;
use tracing::{info, warn};

/// Static metadata about an attack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttackDescription {
    pub title: &'static str,
    pub reference: &'static str,
    pub summary: &'static str,
    pub detailed: &'static str,
}

/// Lifecycle shared by gradient inversion attacks
pub trait GradientInversionAttack {
    /// Serializable knobs the attack accepts
    type Params;

    /// Title, citation and summary
    fn description(&self) -> AttackDescription;

    /// Compute the reference gradient and a fresh candidate
    fn prepare(&mut self) -> Result<()>;

    /// Start the reconstruction sequence
    fn run(&mut self) -> Result<ReconstructionLoop<'_>>;

    /// Drop all run state and prepare again from the original model
    fn reset(&mut self) -> Result<()>;

    /// Validate and replace the knobs
    fn configure(&mut self, params: Self::Params) -> Result<()>;

    /// Let an outer tuning loop pick the knobs worth searching
    fn suggest_parameters(&mut self, trial: &mut dyn HyperparameterTrial) -> Result<()>;
}

/// Output of [`InvertingGradients::prepare`]
struct Prepared {
    client_gradient: Vec<Tensor>,
    candidate: CandidateBatch,
    reconstruction_loader: DataLoader,
}

/// Inverting Gradients attack on one client update
pub struct InvertingGradients {
    original_model: Box<dyn MetaModel>,
    model: Box<dyn MetaModel>,
    client_loader: DataLoader,
    simulator: Box<dyn TrainingSimulator>,
    normalization: Normalization,
    config: InvertingConfig,
    prepared: Prepared,
    best: BestReconstruction,
    state: AttackState,
}

impl InvertingGradients {
    /// Copy the model and prepare the attack
    pub fn new(
        model: Box<dyn MetaModel>,
        client_loader: DataLoader,
        simulator: Box<dyn TrainingSimulator>,
        normalization: Normalization,
        config: InvertingConfig,
    ) -> Result<Self> {
        let working = model.deep_copy();
        let prepared = Self::compute_preparation(
            working.as_ref(),
            &client_loader,
            simulator.as_ref(),
            &normalization,
            &config,
        )?;
        info!(
            model = working.name(),
            simulator = simulator.name(),
            batches = client_loader.len(),
            "inverting gradients initialized"
        );
        Ok(Self {
            original_model: model,
            model: working,
            client_loader,
            simulator,
            normalization,
            config,
            prepared,
            best: BestReconstruction::default(),
            state: AttackState::Prepared,
        })
    }

    fn compute_preparation(
        model: &dyn MetaModel,
        client_loader: &DataLoader,
        simulator: &dyn TrainingSimulator,
        normalization: &Normalization,
        config: &InvertingConfig,
    ) -> Result<Prepared> {
        let params = config.params();
        if params.modality == Modality::Text && normalization.channels() > 1 {
            warn!("per-channel normalization on text data; snapshots use axis 1 statistics");
        }

        model.zero_grad();
        let gradient = simulator.train(
            model,
            client_loader,
            config.optimizer(),
            config.criterion(),
            params.epochs,
        )?;
        let client_gradient: Vec<Tensor> = gradient.iter().map(Tensor::detach).collect();
        model.zero_grad();

        let tokens = used_tokens(model, &client_gradient);
        let (candidate, reconstruction_loader) = config
            .data_extension()
            .get_candidate(client_loader, tokens.as_deref())?;
        candidate.enable_grad()?;

        for (tensor, batch) in candidate.tensors().iter().zip(client_loader.iter()) {
            if tensor.shape() != batch.inputs.shape() {
                return Err(Error::InvalidShape(format!(
                    "candidate {:?} does not match client batch {:?}",
                    tensor.shape(),
                    batch.inputs.shape()
                )));
            }
            normalization.check_shape(&tensor.shape())?;
        }

        Ok(Prepared {
            client_gradient,
            candidate,
            reconstruction_loader,
        })
    }

    /// Step function for the configured modality
    fn step_fn(modality: Modality) -> StepFn {
        match modality {
            Modality::Image => image_step,
            Modality::Text => text_step,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &InvertingConfig {
        &self.config
    }

    /// Best reconstruction of the latest run
    pub fn best(&self) -> &BestReconstruction {
        &self.best
    }

    /// Detached client update the attack matches against
    pub fn client_gradient(&self) -> &[Tensor] {
        &self.prepared.client_gradient
    }

    /// Candidate under optimization
    pub fn reconstruction(&self) -> &CandidateBatch {
        &self.prepared.candidate
    }

    /// Loader feeding the candidate to the simulator
    pub fn reconstruction_loader(&self) -> &DataLoader {
        &self.prepared.reconstruction_loader
    }

    /// Working copy of the model
    pub fn model(&self) -> &dyn MetaModel {
        self.model.as_ref()
    }

    /// Normalization statistics of the client data
    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    /// Lifecycle state
    pub fn state(&self) -> AttackState {
        self.state
    }
}

impl GradientInversionAttack for InvertingGradients {
    type Params = InvertingParams;

    fn description(&self) -> AttackDescription {
        AttackDescription {
            title: "Inverting gradients",
            reference: "Geiping, Jonas, et al. Inverting gradients-how easy is it to break \
                        privacy in federated learning? Neurips, 2020.",
            summary: "Optimizes a synthetic batch until the client update it produces \
                      points the same way as the observed one.",
            detailed: "Image data: cosine gradient distance plus total variation, \
                       sign-gradient steps, clamping to the pixel range and optional median \
                       pooling. Text data: L2 gradient distance plus a penalty on negative \
                       token weights. Both decay the learning rate on a schedule and keep the \
                       lowest-loss candidate.",
        }
    }

    fn prepare(&mut self) -> Result<()> {
        self.prepared = Self::compute_preparation(
            self.model.as_ref(),
            &self.client_loader,
            self.simulator.as_ref(),
            &self.normalization,
            &self.config,
        )?;
        self.state = AttackState::Prepared;
        Ok(())
    }

    fn run(&mut self) -> Result<ReconstructionLoop<'_>> {
        if self.state == AttackState::Idle {
            return Err(Error::AttackExhausted);
        }
        let params = self.config.params().clone();
        let step_fn = Self::step_fn(params.modality);
        let context = StepContext {
            model: self.model.as_ref(),
            simulator: self.simulator.as_ref(),
            config: &self.config,
            params,
            client_gradient: &self.prepared.client_gradient,
            candidate: &self.prepared.candidate,
            reconstruction_loader: &self.prepared.reconstruction_loader,
        };
        ReconstructionLoop::new(LoopInputs {
            context,
            step_fn,
            client_loader: &self.client_loader,
            normalization: &self.normalization,
            best: &mut self.best,
            state: &mut self.state,
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.best.clear();
        self.model = self.original_model.deep_copy();
        self.prepare()?;
        info!("inverting attack reset to initial state");
        Ok(())
    }

    fn configure(&mut self, params: InvertingParams) -> Result<()> {
        if params.epochs != self.config.params().epochs {
            warn!(
                epochs = params.epochs,
                "new epoch count applies to the client gradient after reset"
            );
        }
        self.config.set_params(params)
    }

    fn suggest_parameters(&mut self, trial: &mut dyn HyperparameterTrial) -> Result<()> {
        let total_variation = trial.suggest_float("total_variation", 1e-6, 1e-1, true)?;
        let mut params = self.config.params().clone();
        params.tv_reg = total_variation as f32;
        self.config.set_params(params)
    }
}

/// Cosine distance plus total variation, then sign of the candidate gradient
fn image_step(ctx: &StepContext<'_>) -> Result<Tensor> {
    ctx.zero_grad();
    let gradient = ctx.candidate_gradient()?;
    let mut loss = cosine_similarity_weights(&gradient, ctx.client_gradient, ctx.params.top10norms)?;
    for candidate in ctx.candidate.tensors() {
        let tv = total_variation(candidate)?;
        loss = add(&loss, &scale(&tv, ctx.params.tv_reg));
    }
    backward(&loss)?;
    for candidate in ctx.candidate.tensors() {
        candidate.map_grad_inplace(|g| *g = sign(*g));
    }
    Ok(loss)
}

/// L2 distance plus the negative-range penalty, raw gradient
fn text_step(ctx: &StepContext<'_>) -> Result<Tensor> {
    ctx.zero_grad();
    let gradient = ctx.candidate_gradient()?;
    let mut loss = l2_distance(&gradient, ctx.client_gradient)?;
    for candidate in ctx.candidate.tensors() {
        let penalty = negative_range_penalty(candidate);
        loss = add(&loss, &scale(&penalty, ctx.params.range_penalty));
    }
    backward(&loss)?;
    Ok(loss)
}
