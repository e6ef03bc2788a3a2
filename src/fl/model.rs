//! Functional models for meta-differentiable training
//!
//! A [`MetaModel`] owns its parameters but evaluates with whatever parameter
//! slice it is handed, so a simulated client update can feed meta-updated
//! parameters into the next step without breaking the graph.

use crate::autograd::{add, broadcast_to, matmul, relu, reshape};
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Model whose forward pass is a pure function of an explicit parameter list
pub trait MetaModel {
    /// The model's own parameter tensors, in a fixed order
    fn parameters(&self) -> &[Tensor];

    /// Evaluate the model with `params` in place of its own parameters
    fn forward(&self, params: &[Tensor], inputs: &Tensor) -> Result<Tensor>;

    /// Independent copy with fresh parameter storage
    fn deep_copy(&self) -> Box<dyn MetaModel>;

    /// Position of the token embedding matrix in [`MetaModel::parameters`]
    fn embedding_index(&self) -> Option<usize> {
        None
    }

    /// Name of the architecture
    fn name(&self) -> &'static str;

    /// Release accumulated parameter gradients
    fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }
}

/// Uniform initialization in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`
fn init_uniform(rng: &mut StdRng, shape: &[usize], fan_in: usize) -> Tensor {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    let data = ArrayD::from_shape_fn(IxDyn(shape), |_| rng.random_range(-bound..bound));
    Tensor::new(data, true)
}

fn check_params(name: &str, params: &[Tensor], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(Error::Simulation(format!(
            "{name} expects {expected} parameter tensors, got {}",
            params.len()
        )));
    }
    Ok(())
}

/// Flatten `[batch, ...]` inputs to `[batch, features]`
fn flatten_batch(inputs: &Tensor, features: usize) -> Result<Tensor> {
    let shape = inputs.shape();
    let batch = shape.first().copied().unwrap_or(0);
    if batch == 0 || inputs.len() != batch * features {
        return Err(Error::InvalidShape(format!(
            "input of shape {shape:?} does not flatten to [batch, {features}]"
        )));
    }
    Ok(reshape(inputs, &[batch, features]))
}

/// `x @ w + b` with the bias broadcast over the batch
fn affine(x: &Tensor, w: &Tensor, b: &Tensor) -> Tensor {
    let out = matmul(x, w);
    let bias = broadcast_to(b, &out.shape());
    add(&out, &bias)
}

/// Single linear layer over flattened inputs
///
/// Parameters: weight `[in_features, out_features]`, bias `[out_features]`.
pub struct LinearClassifier {
    params: Vec<Tensor>,
    in_features: usize,
}

impl LinearClassifier {
    /// Randomly initialized classifier
    pub fn new(in_features: usize, out_features: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let weight = init_uniform(&mut rng, &[in_features, out_features], in_features);
        let bias = init_uniform(&mut rng, &[out_features], in_features);
        Self {
            params: vec![weight, bias],
            in_features,
        }
    }

    /// Classifier with explicit weights
    pub fn from_weights(weight: ArrayD<f32>, bias: ArrayD<f32>) -> Result<Self> {
        if weight.ndim() != 2 || bias.shape() != [weight.shape()[1]] {
            return Err(Error::InvalidShape(format!(
                "weight {:?} and bias {:?} do not form a linear layer",
                weight.shape(),
                bias.shape()
            )));
        }
        let in_features = weight.shape()[0];
        Ok(Self {
            params: vec![Tensor::new(weight, true), Tensor::new(bias, true)],
            in_features,
        })
    }
}

impl MetaModel for LinearClassifier {
    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn forward(&self, params: &[Tensor], inputs: &Tensor) -> Result<Tensor> {
        check_params(self.name(), params, 2)?;
        let x = flatten_batch(inputs, self.in_features)?;
        Ok(affine(&x, &params[0], &params[1]))
    }

    fn deep_copy(&self) -> Box<dyn MetaModel> {
        Box::new(Self {
            params: self.params.iter().map(Tensor::deep_copy).collect(),
            in_features: self.in_features,
        })
    }

    fn name(&self) -> &'static str {
        "LinearClassifier"
    }
}

/// Two-layer perceptron with a ReLU hidden layer
pub struct Mlp {
    params: Vec<Tensor>,
    in_features: usize,
}

impl Mlp {
    /// Randomly initialized perceptron
    pub fn new(in_features: usize, hidden: usize, out_features: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = vec![
            init_uniform(&mut rng, &[in_features, hidden], in_features),
            init_uniform(&mut rng, &[hidden], in_features),
            init_uniform(&mut rng, &[hidden, out_features], hidden),
            init_uniform(&mut rng, &[out_features], hidden),
        ];
        Self {
            params,
            in_features,
        }
    }
}

impl MetaModel for Mlp {
    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn forward(&self, params: &[Tensor], inputs: &Tensor) -> Result<Tensor> {
        check_params(self.name(), params, 4)?;
        let x = flatten_batch(inputs, self.in_features)?;
        let hidden = relu(&affine(&x, &params[0], &params[1]));
        Ok(affine(&hidden, &params[2], &params[3]))
    }

    fn deep_copy(&self) -> Box<dyn MetaModel> {
        Box::new(Self {
            params: self.params.iter().map(Tensor::deep_copy).collect(),
            in_features: self.in_features,
        })
    }

    fn name(&self) -> &'static str {
        "Mlp"
    }
}

/// Text classifier over bag-of-token weights
///
/// Inputs are `[batch, vocab]` token weights. Parameters: embedding
/// `[vocab, dim]`, head weight `[dim, classes]`, head bias `[classes]`.
/// The embedding gradient is non-zero exactly on the rows of tokens present
/// in the batch.
pub struct BagOfTokensClassifier {
    params: Vec<Tensor>,
    vocab: usize,
}

impl BagOfTokensClassifier {
    /// Randomly initialized classifier
    pub fn new(vocab: usize, dim: usize, classes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = vec![
            init_uniform(&mut rng, &[vocab, dim], dim),
            init_uniform(&mut rng, &[dim, classes], dim),
            init_uniform(&mut rng, &[classes], dim),
        ];
        Self { params, vocab }
    }

    /// Vocabulary size
    pub fn vocab(&self) -> usize {
        self.vocab
    }
}

impl MetaModel for BagOfTokensClassifier {
    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn forward(&self, params: &[Tensor], inputs: &Tensor) -> Result<Tensor> {
        check_params(self.name(), params, 3)?;
        let x = flatten_batch(inputs, self.vocab)?;
        let embedded = matmul(&x, &params[0]);
        Ok(affine(&embedded, &params[1], &params[2]))
    }

    fn deep_copy(&self) -> Box<dyn MetaModel> {
        Box::new(Self {
            params: self.params.iter().map(Tensor::deep_copy).collect(),
            vocab: self.vocab,
        })
    }

    fn embedding_index(&self) -> Option<usize> {
        Some(0)
    }

    fn name(&self) -> &'static str {
        "BagOfTokensClassifier"
    }
}
