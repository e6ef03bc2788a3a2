//! Batches and an in-memory data loader

use crate::error::{Error, Result};
use crate::Tensor;

/// A training batch containing inputs and targets
#[derive(Clone, Debug)]
pub struct Batch {
    /// Input features, batch on axis 0
    pub inputs: Tensor,
    /// Target labels/values
    pub targets: Tensor,
}

impl Batch {
    /// Create a new batch
    pub fn new(inputs: Tensor, targets: Tensor) -> Self {
        Self { inputs, targets }
    }

    /// Number of samples (length of axis 0)
    pub fn size(&self) -> usize {
        self.inputs.shape().first().copied().unwrap_or(0)
    }
}

/// Ordered, replayable sequence of batches
#[derive(Clone, Debug, Default)]
pub struct DataLoader {
    batches: Vec<Batch>,
}

impl DataLoader {
    /// Create a loader over the given batches
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    /// Iterate over batches in order
    pub fn iter(&self) -> std::slice::Iter<'_, Batch> {
        self.batches.iter()
    }

    /// All batches
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Number of batches
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check if the loader holds no batches
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Total number of samples across batches
    pub fn num_samples(&self) -> usize {
        self.batches.iter().map(Batch::size).sum()
    }

    /// Handles to every batch's inputs
    pub fn inputs(&self) -> Vec<Tensor> {
        self.batches.iter().map(|b| b.inputs.clone()).collect()
    }

    /// Loader with the same targets and `inputs` swapped in
    ///
    /// The new inputs are used by handle, so the returned loader shares
    /// storage with them. Targets are copied.
    pub fn with_inputs(&self, inputs: &[Tensor]) -> Result<DataLoader> {
        if inputs.len() != self.batches.len() {
            return Err(Error::InvalidShape(format!(
                "{} input tensors for {} batches",
                inputs.len(),
                self.batches.len()
            )));
        }
        let batches = self
            .batches
            .iter()
            .zip(inputs)
            .map(|(batch, input)| {
                if input.shape() != batch.inputs.shape() {
                    return Err(Error::InvalidShape(format!(
                        "replacement input {:?} does not match batch input {:?}",
                        input.shape(),
                        batch.inputs.shape()
                    )));
                }
                Ok(Batch::new(input.clone(), batch.targets.detach()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(DataLoader::new(batches))
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = &'a Batch;
    type IntoIter = std::slice::Iter<'a, Batch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
