//! Per-channel normalization statistics

use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis};
use serde::{Deserialize, Serialize};

/// Mean/std of the training distribution, per channel or as a single pair
///
/// With more than one channel the statistics apply along axis 1 of
/// `[batch, channels, ...]` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalization {
    /// Per-channel statistics
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self> {
        if mean.is_empty() || mean.len() != std.len() {
            return Err(Error::config(
                "normalization",
                format!("mean has {} channels, std has {}", mean.len(), std.len()),
            ));
        }
        if let Some(s) = std.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::config(
                "normalization",
                format!("std must be positive and finite, got {s}"),
            ));
        }
        Ok(Self { mean, std })
    }

    /// One mean/std pair for every element
    pub fn scalar(mean: f32, std: f32) -> Result<Self> {
        Self::new(vec![mean], vec![std])
    }

    /// Statistics of already-standardized data
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0],
            std: vec![1.0],
        }
    }

    /// Number of channels the statistics describe
    pub fn channels(&self) -> usize {
        self.mean.len()
    }

    /// Per-channel means
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// Per-channel standard deviations
    pub fn std(&self) -> &[f32] {
        &self.std
    }

    /// Check that data of `shape` carries one channel per statistic
    pub fn check_shape(&self, shape: &[usize]) -> Result<()> {
        let channels = self.channels();
        if channels > 1 && shape.get(1) != Some(&channels) {
            return Err(Error::InvalidShape(format!(
                "data of shape {shape:?} does not have {channels} channels on axis 1"
            )));
        }
        Ok(())
    }

    /// Valid normalized range of channel `c` for data originally in `[0, 1]`
    pub fn data_range(&self, channel: usize) -> (f32, f32) {
        let c = channel.min(self.channels() - 1);
        ((0.0 - self.mean[c]) / self.std[c], (1.0 - self.mean[c]) / self.std[c])
    }

    fn per_channel(&self, data: &mut ArrayD<f32>, f: impl Fn(usize, &mut f32)) -> Result<()> {
        self.check_shape(data.shape())?;
        if self.channels() == 1 {
            data.map_inplace(|v| f(0, v));
        } else {
            for (c, mut lane) in data.axis_iter_mut(Axis(1)).enumerate() {
                lane.map_inplace(|v| f(c, v));
            }
        }
        Ok(())
    }

    /// `x * std + mean`
    pub fn denormalize(&self, data: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut out = data.clone();
        self.per_channel(&mut out, |c, v| *v = *v * self.std[c] + self.mean[c])?;
        Ok(out)
    }

    /// `(x - mean) / std`
    pub fn normalize(&self, data: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let mut out = data.clone();
        self.per_channel(&mut out, |c, v| *v = (*v - self.mean[c]) / self.std[c])?;
        Ok(out)
    }

    /// Clamp normalized data into its valid range in place
    pub fn clamp_in_place(&self, data: &mut ArrayD<f32>) -> Result<()> {
        self.per_channel(data, |c, v| {
            let (lo, hi) = self.data_range(c);
            *v = v.clamp(lo, hi);
        })
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::identity()
    }
}
