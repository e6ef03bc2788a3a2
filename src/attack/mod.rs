//! Gradient inversion attacks
//!
//! [`InvertingGradients`] reconstructs client data from a federated update:
//! it replays local training on a synthetic candidate and optimizes the
//! candidate until its update matches the observed one.
//!
//! # Example
//!
//! ```
//! use invertir::attack::{GradientInversionAttack, InvertingConfig, InvertingGradients, InvertingParams};
//! use invertir::data::{Batch, DataLoader, ImageExtension, Normalization};
//! use invertir::fl::{one_hot, CrossEntropyLoss, LinearClassifier, MetaSgd, WeightDeltaSimulator};
//! use invertir::Tensor;
//!
//! let images = Tensor::from_shape_vec(&[1, 1, 2, 2], vec![0.2, 0.8, 0.5, 0.1], false).unwrap();
//! let loader = DataLoader::new(vec![Batch::new(images, one_hot(&[0], 3).unwrap())]);
//! let params = InvertingParams { at_iterations: 3, ..Default::default() };
//! let config = InvertingConfig::new(
//!     params,
//!     Box::new(MetaSgd::default()),
//!     Box::new(CrossEntropyLoss),
//!     Box::new(ImageExtension::new(0)),
//! )
//! .unwrap();
//! let mut attack = InvertingGradients::new(
//!     Box::new(LinearClassifier::new(4, 3, 1)),
//!     loader,
//!     Box::new(WeightDeltaSimulator),
//!     Normalization::identity(),
//!     config,
//! )
//! .unwrap();
//!
//! let steps: Vec<_> = attack.run().unwrap().collect::<Result<_, _>>().unwrap();
//! assert_eq!(steps.len(), 3);
//! ```

mod attack_loop;
mod config;
mod inverting;
mod regularizer;
mod results;
mod similarity;

pub use attack_loop::{AttackState, LoopInputs, ReconstructionLoop, StepContext, StepFn};
pub use config::{AttackOptimizer, InvertingConfig, InvertingParams, LrSchedule, Modality};
pub use inverting::{AttackDescription, GradientInversionAttack, InvertingGradients};
pub use regularizer::{median_pool2d, negative_range_penalty, total_variation};
pub use results::{mse, psnr, AttackStep, BestReconstruction, GiaResults};
pub use similarity::{cosine_similarity_weights, l2_distance, NORM_EPSILON, TOP_K_LAYERS};
