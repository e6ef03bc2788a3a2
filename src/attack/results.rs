//! Progress items, per-iteration metrics and the best-reconstruction record

use crate::error::Result;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Metrics reported with every attack iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiaResults {
    /// Iteration index, starting at 0
    pub iteration: usize,
    /// Reconstruction loss of this iteration
    pub loss: f32,
    /// Lowest loss seen so far
    pub best_loss: f32,
    /// Iteration the lowest loss was seen at
    pub best_iteration: Option<usize>,
    /// Learning rate the step was taken with
    pub learning_rate: f32,
    /// Mean squared error between denormalized client data and best candidate
    pub mse: Option<f32>,
    /// Peak signal-to-noise ratio in dB for `[0, 1]` images
    pub psnr: Option<f32>,
}

impl GiaResults {
    /// Serialize as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One element of the attack sequence
#[derive(Debug, Clone)]
pub struct AttackStep {
    /// Iteration index, starting at 0
    pub iteration: usize,
    /// Denormalized candidate after this iteration, one array per batch
    pub snapshot: Vec<ArrayD<f32>>,
    /// Metrics of this iteration
    pub result: GiaResults,
}

/// Lowest-loss candidate seen during a run
#[derive(Debug, Clone)]
pub struct BestReconstruction {
    loss: f32,
    snapshot: Option<Vec<ArrayD<f32>>>,
    iteration: Option<usize>,
}

impl Default for BestReconstruction {
    fn default() -> Self {
        Self {
            loss: f32::INFINITY,
            snapshot: None,
            iteration: None,
        }
    }
}

impl BestReconstruction {
    /// Lowest loss, `+inf` when empty
    pub fn loss(&self) -> f32 {
        self.loss
    }

    /// Denormalized candidate that produced [`BestReconstruction::loss`]
    pub fn snapshot(&self) -> Option<&[ArrayD<f32>]> {
        self.snapshot.as_deref()
    }

    /// Iteration of the lowest loss
    pub fn iteration(&self) -> Option<usize> {
        self.iteration
    }

    /// Check if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Record `loss` if it is strictly lower than the current best
    ///
    /// The snapshot is only taken when the record changes.
    pub fn update(
        &mut self,
        loss: f32,
        iteration: usize,
        snapshot: impl FnOnce() -> Result<Vec<ArrayD<f32>>>,
    ) -> Result<bool> {
        if loss.is_nan() || loss >= self.loss {
            return Ok(false);
        }
        self.snapshot = Some(snapshot()?);
        self.loss = loss;
        self.iteration = Some(iteration);
        Ok(true)
    }

    /// Forget the record
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Mean squared error over paired arrays
pub fn mse(a: &[ArrayD<f32>], b: &[ArrayD<f32>]) -> Option<f32> {
    if a.len() != b.len() || a.iter().zip(b).any(|(x, y)| x.shape() != y.shape()) {
        return None;
    }
    let count: usize = a.iter().map(ArrayD::len).sum();
    if count == 0 {
        return None;
    }
    let total: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).mapv(|d| d * d).sum())
        .sum();
    Some(total / count as f32)
}

/// PSNR in dB for data with unit dynamic range
pub fn psnr(mse: f32) -> f32 {
    if mse <= 0.0 {
        f32::INFINITY
    } else {
        -10.0 * mse.log10()
    }
}
