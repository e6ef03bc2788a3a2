//! Modality extensions: initial reconstruction candidates
//!
//! An extension looks at the client loader (shapes and targets only, never
//! the private inputs' values) and produces the candidate tensors plus a
//! loader view that feeds them through the training simulator.

use super::DataLoader;
use crate::error::{Error, Result};
use crate::fl::MetaModel;
use crate::Tensor;
use ndarray::{ArrayD, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// The tensors under optimization, one per client batch
///
/// Every tensor is a leaf with gradient tracking enabled.
#[derive(Clone, Debug)]
pub struct CandidateBatch {
    tensors: Vec<Tensor>,
}

impl CandidateBatch {
    /// Wrap leaf tensors and enable gradient tracking on all of them
    pub fn new(tensors: Vec<Tensor>) -> Result<Self> {
        if tensors.is_empty() {
            return Err(Error::EmptyLoader);
        }
        let batch = Self { tensors };
        batch.enable_grad()?;
        Ok(batch)
    }

    /// Turn on gradient tracking for every candidate tensor
    pub fn enable_grad(&self) -> Result<()> {
        self.tensors.iter().try_for_each(|t| t.set_requires_grad(true))
    }

    /// Candidate tensors
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Number of candidate tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if there are no candidate tensors
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Copy of the current candidate values
    pub fn snapshot(&self) -> Vec<ArrayD<f32>> {
        self.tensors.iter().map(Tensor::to_array).collect()
    }

    /// Current gradients of the candidate tensors
    pub fn gradients(&self) -> Vec<Option<ArrayD<f32>>> {
        self.tensors.iter().map(Tensor::grad).collect()
    }

    /// Release every candidate gradient
    pub fn zero_grad(&self) {
        for t in &self.tensors {
            t.zero_grad();
        }
    }
}

/// Builds the initial candidate for one modality
pub trait DataExtension {
    /// Candidate batch and the loader that feeds it to the simulator
    ///
    /// `used_tokens` is the auxiliary signal extracted from the client
    /// gradient; image extensions ignore it.
    fn get_candidate(
        &self,
        loader: &DataLoader,
        used_tokens: Option<&[usize]>,
    ) -> Result<(CandidateBatch, DataLoader)>;

    /// Name of the extension
    fn name(&self) -> &'static str;
}

fn finish(loader: &DataLoader, tensors: Vec<Tensor>) -> Result<(CandidateBatch, DataLoader)> {
    let candidate = CandidateBatch::new(tensors)?;
    let reconstruction_loader = loader.with_inputs(candidate.tensors())?;
    Ok((candidate, reconstruction_loader))
}

/// Image classification: standard normal noise shaped like each batch
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageExtension {
    /// Seed for the candidate noise
    pub seed: u64,
}

impl ImageExtension {
    /// Create an extension with a fixed seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl DataExtension for ImageExtension {
    fn get_candidate(
        &self,
        loader: &DataLoader,
        _used_tokens: Option<&[usize]>,
    ) -> Result<(CandidateBatch, DataLoader)> {
        if loader.is_empty() {
            return Err(Error::EmptyLoader);
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let tensors = loader
            .iter()
            .map(|batch| {
                let shape = batch.inputs.shape();
                let data = ArrayD::from_shape_fn(IxDyn(&shape), |_| rng.sample(StandardNormal));
                Tensor::new(data, true)
            })
            .collect();
        finish(loader, tensors)
    }

    fn name(&self) -> &'static str {
        "ImageClassification"
    }
}

/// Text classification over `[batch, vocab]` token weights
///
/// Candidate mass is uniform in `[0, 1)` on the used tokens and zero
/// elsewhere; with no known tokens every column is initialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtension {
    /// Seed for the candidate weights
    pub seed: u64,
}

impl TextExtension {
    /// Create an extension with a fixed seed
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl DataExtension for TextExtension {
    fn get_candidate(
        &self,
        loader: &DataLoader,
        used_tokens: Option<&[usize]>,
    ) -> Result<(CandidateBatch, DataLoader)> {
        if loader.is_empty() {
            return Err(Error::EmptyLoader);
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let tensors = loader
            .iter()
            .map(|batch| {
                let shape = batch.inputs.shape();
                let vocab = match shape.as_slice() {
                    [_, vocab] => *vocab,
                    _ => {
                        return Err(Error::InvalidShape(format!(
                            "text inputs must be [batch, vocab], got {shape:?}"
                        )))
                    }
                };
                let active: Vec<usize> = match used_tokens {
                    Some(tokens) if !tokens.is_empty() => tokens.to_vec(),
                    _ => (0..vocab).collect(),
                };
                if let Some(&token) = active.iter().find(|&&t| t >= vocab) {
                    return Err(Error::InvalidShape(format!(
                        "token {token} outside vocabulary of {vocab}"
                    )));
                }

                let mut data = ArrayD::zeros(IxDyn(&shape));
                for mut row in data.axis_iter_mut(Axis(0)) {
                    for &token in &active {
                        row[[token]] = rng.random::<f32>();
                    }
                }
                Ok(Tensor::new(data, true))
            })
            .collect::<Result<Vec<_>>>()?;
        finish(loader, tensors)
    }

    fn name(&self) -> &'static str {
        "TextClassification"
    }
}

/// Tokens whose embedding row received a non-zero gradient
///
/// Returns `None` when the model has no token embedding.
pub fn used_tokens(model: &dyn MetaModel, gradient: &[Tensor]) -> Option<Vec<usize>> {
    let index = model.embedding_index()?;
    let embedding = gradient.get(index)?;
    let data = embedding.data();
    if data.ndim() != 2 {
        return None;
    }
    Some(
        data.axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, row)| row.iter().any(|&v| v != 0.0))
            .map(|(token, _)| token)
            .collect(),
    )
}
