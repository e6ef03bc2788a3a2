//! Federated-learning client simulation
//!
//! Everything here is differentiable end to end: a [`TrainingSimulator`]
//! replays a client update with a [`MetaOptimizer`] over a [`MetaModel`], and
//! the resulting update can be differentiated with respect to the data.

mod loss;
mod meta_optim;
mod model;
mod simulator;

pub use loss::{one_hot, CrossEntropyLoss, MetaLoss, MseLoss};
pub use meta_optim::{MetaOptimizer, MetaSgd};
pub use model::{BagOfTokensClassifier, LinearClassifier, MetaModel, Mlp};
pub use simulator::{GradientSimulator, TrainingSimulator, WeightDeltaSimulator};
