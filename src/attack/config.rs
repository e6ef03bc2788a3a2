//! Attack configuration
//!
//! [`InvertingParams`] holds the serializable knobs and loads from YAML.
//! [`InvertingConfig`] pairs them with the strategy objects, which every
//! caller passes explicitly so no two attacks share one by accident.

use crate::data::DataExtension;
use crate::error::{Error, Result};
use crate::fl::{MetaLoss, MetaOptimizer};
use crate::optim::{Adam, ConstantLR, LRScheduler, MultiStepLR, Optimizer, StepDecayLR, SGD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Kind of data being reconstructed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Cosine matching, total variation, sign steps, clamping, median pooling
    #[default]
    Image,
    /// L2 matching with a negative-range penalty, raw gradient steps
    Text,
}

/// Optimizer applied to the reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackOptimizer {
    #[default]
    Adam,
    Sgd,
}

impl AttackOptimizer {
    /// Instantiate the optimizer with learning rate `lr`
    pub fn build(self, lr: f32) -> Box<dyn Optimizer> {
        match self {
            AttackOptimizer::Adam => Box::new(Adam::default_params(lr)),
            AttackOptimizer::Sgd => Box::new(SGD::new(lr, 0.0)),
        }
    }
}

/// Learning-rate schedule over the attack iterations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LrSchedule {
    /// Keep the initial rate
    Constant,
    /// Multiply by `gamma` every `step_size` iterations
    StepDecay { step_size: usize, gamma: f32 },
    /// Multiply by `gamma` at each milestone, given as fractions of the run
    MultiStep { milestones: Vec<f32>, gamma: f32 },
}

impl Default for LrSchedule {
    fn default() -> Self {
        LrSchedule::MultiStep {
            milestones: vec![0.375, 0.625, 0.875],
            gamma: 0.1,
        }
    }
}

impl LrSchedule {
    /// Instantiate the schedule for a run of `total` iterations
    pub fn build(&self, lr: f32, total: usize) -> Box<dyn LRScheduler> {
        match self {
            LrSchedule::Constant => Box::new(ConstantLR::new(lr)),
            LrSchedule::StepDecay { step_size, gamma } => {
                Box::new(StepDecayLR::new(lr, *step_size, *gamma))
            }
            LrSchedule::MultiStep { milestones, gamma } => {
                Box::new(MultiStepLR::from_fractions(lr, total, milestones, *gamma))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let gamma = match self {
            LrSchedule::Constant => return Ok(()),
            LrSchedule::StepDecay { step_size, gamma } => {
                if *step_size == 0 {
                    return Err(Error::config("lr_schedule.step_size", "must be at least 1"));
                }
                *gamma
            }
            LrSchedule::MultiStep { milestones, gamma } => {
                if let Some(m) = milestones.iter().find(|m| !(0.0..=1.0).contains(*m)) {
                    return Err(Error::config(
                        "lr_schedule.milestones",
                        format!("fractions must lie in [0, 1], got {m}"),
                    ));
                }
                *gamma
            }
        };
        if !(gamma > 0.0 && gamma <= 1.0) {
            return Err(Error::config(
                "lr_schedule.gamma",
                format!("must be in (0, 1], got {gamma}"),
            ));
        }
        Ok(())
    }
}

/// Serializable knobs of the inverting-gradients attack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvertingParams {
    /// Weight of the total-variation prior
    pub tv_reg: f32,
    /// Learning rate of the attack optimizer
    pub attack_lr: f32,
    /// Number of attack iterations
    pub at_iterations: usize,
    /// Local epochs the training simulator replays
    pub epochs: usize,
    /// Median-pool image candidates during the run
    pub median_pooling: bool,
    /// Iterations between median-pooling passes
    pub median_pool_interval: usize,
    /// Match only the ten parameters with the largest client-gradient norm
    pub top10norms: bool,
    /// Image or text reconstruction
    pub modality: Modality,
    /// Optimizer applied to the reconstruction
    pub attack_optimizer: AttackOptimizer,
    /// Learning-rate schedule
    pub lr_schedule: LrSchedule,
    /// Keep image candidates inside the normalized `[0, 1]` pixel range
    pub clamp_to_data_range: bool,
    /// Weight of the negative-range penalty for text
    pub range_penalty: f32,
    /// Iterations between progress log lines
    pub log_interval: usize,
}

impl Default for InvertingParams {
    fn default() -> Self {
        Self {
            tv_reg: 1.0e-6,
            attack_lr: 0.1,
            at_iterations: 8000,
            epochs: 1,
            median_pooling: false,
            median_pool_interval: 500,
            top10norms: false,
            modality: Modality::Image,
            attack_optimizer: AttackOptimizer::Adam,
            lr_schedule: LrSchedule::default(),
            clamp_to_data_range: true,
            range_penalty: 0.01,
            log_interval: 250,
        }
    }
}

impl InvertingParams {
    /// Check every knob for a usable value
    pub fn validate(&self) -> Result<()> {
        if !(self.tv_reg.is_finite() && self.tv_reg >= 0.0) {
            return Err(Error::config(
                "tv_reg",
                format!("must be finite and >= 0, got {}", self.tv_reg),
            ));
        }
        if !(self.attack_lr.is_finite() && self.attack_lr > 0.0) {
            return Err(Error::config(
                "attack_lr",
                format!("must be finite and > 0, got {}", self.attack_lr),
            ));
        }
        if self.at_iterations == 0 {
            return Err(Error::config("at_iterations", "must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(Error::config("epochs", "must be at least 1"));
        }
        if self.median_pool_interval == 0 {
            return Err(Error::config("median_pool_interval", "must be at least 1"));
        }
        if !(self.range_penalty.is_finite() && self.range_penalty >= 0.0) {
            return Err(Error::config(
                "range_penalty",
                format!("must be finite and >= 0, got {}", self.range_penalty),
            ));
        }
        if self.log_interval == 0 {
            return Err(Error::config("log_interval", "must be at least 1"));
        }
        self.lr_schedule.validate()
    }

    /// Parse and validate YAML
    ///
    /// # Example
    ///
    /// ```
    /// use invertir::attack::{InvertingParams, Modality};
    ///
    /// let params = InvertingParams::from_yaml_str("at_iterations: 12\nmodality: text\n").unwrap();
    /// assert_eq!(params.at_iterations, 12);
    /// assert_eq!(params.modality, Modality::Text);
    /// assert_eq!(params.attack_lr, 0.1);
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let params: InvertingParams = serde_yaml::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Knobs plus the strategy objects the attack runs with
pub struct InvertingConfig {
    params: InvertingParams,
    optimizer: Box<dyn MetaOptimizer>,
    criterion: Box<dyn MetaLoss>,
    data_extension: Box<dyn DataExtension>,
}

impl InvertingConfig {
    /// Validate `params` and bundle them with the strategies
    pub fn new(
        params: InvertingParams,
        optimizer: Box<dyn MetaOptimizer>,
        criterion: Box<dyn MetaLoss>,
        data_extension: Box<dyn DataExtension>,
    ) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            optimizer,
            criterion,
            data_extension,
        })
    }

    /// Current knobs
    pub fn params(&self) -> &InvertingParams {
        &self.params
    }

    /// Replace the knobs after validating them
    pub fn set_params(&mut self, params: InvertingParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Meta-optimizer used by the training simulator
    pub fn optimizer(&self) -> &dyn MetaOptimizer {
        self.optimizer.as_ref()
    }

    /// Client loss used by the training simulator
    pub fn criterion(&self) -> &dyn MetaLoss {
        self.criterion.as_ref()
    }

    /// Candidate initialization strategy
    pub fn data_extension(&self) -> &dyn DataExtension {
        self.data_extension.as_ref()
    }
}

impl std::fmt::Debug for InvertingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvertingConfig")
            .field("params", &self.params)
            .field("optimizer", &self.optimizer.name())
            .field("criterion", &self.criterion.name())
            .field("data_extension", &self.data_extension.name())
            .finish()
    }
}
