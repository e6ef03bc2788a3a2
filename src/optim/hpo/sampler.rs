//! Trial samplers handed to attacks by an outer tuning loop

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

use super::error::{HPOError, Result};
use super::types::{ParameterDomain, ParameterValue, Trial};

/// Sampling interface an attack uses to draw its own hyperparameters
pub trait HyperparameterTrial {
    /// Draw a float in `[low, high]`, log-uniformly when `log` is set
    fn suggest_float(&mut self, name: &str, low: f64, high: f64, log: bool) -> Result<f64>;
}

/// Random search trial backed by a seeded RNG
pub struct RandomTrial {
    trial: Trial,
    rng: StdRng,
}

impl RandomTrial {
    /// Create a trial with a deterministic seed
    pub fn new(id: usize, seed: u64) -> Self {
        Self {
            trial: Trial::new(id),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Record of the values drawn so far
    pub fn trial(&self) -> &Trial {
        &self.trial
    }

    /// Consume the sampler and return its record
    pub fn into_trial(self) -> Trial {
        self.trial
    }
}

impl HyperparameterTrial for RandomTrial {
    fn suggest_float(&mut self, name: &str, low: f64, high: f64, log: bool) -> Result<f64> {
        let domain = ParameterDomain::continuous(name, low, high, log)?;
        let value = domain.sample(&mut self.rng);
        self.trial.config.insert(name.to_string(), value);
        Ok(value.as_float())
    }
}

/// Trial that replays preset values, for reproducing a tuned configuration
#[derive(Debug, Clone, Default)]
pub struct FixedTrial {
    values: HashMap<String, ParameterValue>,
}

impl FixedTrial {
    /// Create an empty fixed trial
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a preset value
    pub fn with(mut self, name: &str, value: ParameterValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    fn lookup(&self, name: &str, domain: &ParameterDomain) -> Result<ParameterValue> {
        let value = *self
            .values
            .get(name)
            .ok_or_else(|| HPOError::ParameterNotFound(name.to_string()))?;
        if !domain.is_valid(&value) {
            return Err(HPOError::InvalidValue(name.to_string(), format!("{value:?}")));
        }
        Ok(value)
    }
}

impl HyperparameterTrial for FixedTrial {
    fn suggest_float(&mut self, name: &str, low: f64, high: f64, log: bool) -> Result<f64> {
        let domain = ParameterDomain::continuous(name, low, high, log)?;
        Ok(self.lookup(name, &domain)?.as_float())
    }
}
