//! Training simulators: replay a client update on a model copy
//!
//! The returned update keeps its graph, so an attack can differentiate it
//! with respect to any input tensor of the loader that requires grad.

use super::{MetaLoss, MetaModel, MetaOptimizer};
use crate::autograd::{add, grad, scale, sub};
use crate::data::DataLoader;
use crate::error::{Error, Result};
use crate::Tensor;

/// Replays local training and reports the per-parameter client update
pub trait TrainingSimulator {
    /// Run `epochs` of local training on `loader` and return the update
    fn train(
        &self,
        model: &dyn MetaModel,
        loader: &DataLoader,
        optimizer: &dyn MetaOptimizer,
        loss_fn: &dyn MetaLoss,
        epochs: usize,
    ) -> Result<Vec<Tensor>>;

    /// Name of the simulator
    fn name(&self) -> &'static str;
}

fn check_loader(loader: &DataLoader, epochs: usize) -> Result<()> {
    if loader.is_empty() {
        return Err(Error::EmptyLoader);
    }
    if epochs == 0 {
        return Err(Error::config("epochs", "must be at least 1"));
    }
    Ok(())
}

/// FedAvg-style client: local epochs of the meta-optimizer, returns
/// `final_params - initial_params`
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightDeltaSimulator;

impl TrainingSimulator for WeightDeltaSimulator {
    fn train(
        &self,
        model: &dyn MetaModel,
        loader: &DataLoader,
        optimizer: &dyn MetaOptimizer,
        loss_fn: &dyn MetaLoss,
        epochs: usize,
    ) -> Result<Vec<Tensor>> {
        check_loader(loader, epochs)?;
        let initial = model.parameters().to_vec();
        let mut params = initial.clone();

        for _ in 0..epochs {
            for batch in loader.iter() {
                let outputs = model.forward(&params, &batch.inputs)?;
                let loss = loss_fn.forward(&outputs, &batch.targets)?;
                let grads = grad(&loss, &params, true)?;
                params = optimizer.step(&params, &grads)?;
            }
        }

        Ok(params
            .iter()
            .zip(&initial)
            .map(|(p, p0)| sub(p, p0))
            .collect())
    }

    fn name(&self) -> &'static str {
        "WeightDelta"
    }
}

/// FedSGD-style client: one gradient of the mean batch loss
///
/// The meta-optimizer and epoch count are validated but unused.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientSimulator;

impl TrainingSimulator for GradientSimulator {
    fn train(
        &self,
        model: &dyn MetaModel,
        loader: &DataLoader,
        _optimizer: &dyn MetaOptimizer,
        loss_fn: &dyn MetaLoss,
        epochs: usize,
    ) -> Result<Vec<Tensor>> {
        check_loader(loader, epochs)?;
        let params = model.parameters();

        let mut total: Option<Tensor> = None;
        for batch in loader.iter() {
            let outputs = model.forward(params, &batch.inputs)?;
            let loss = loss_fn.forward(&outputs, &batch.targets)?;
            total = Some(match total {
                Some(acc) => add(&acc, &loss),
                None => loss,
            });
        }
        let total = total.ok_or(Error::EmptyLoader)?;
        let mean = scale(&total, 1.0 / loader.len() as f32);
        grad(&mean, params, true)
    }

    fn name(&self) -> &'static str {
        "Gradient"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, narrow, sum};
    use crate::data::Batch;
    use crate::fl::{one_hot, CrossEntropyLoss, LinearClassifier, MetaSgd, MseLoss};
    use approx::assert_abs_diff_eq;

    fn loader(inputs: Tensor) -> DataLoader {
        DataLoader::new(vec![Batch::new(inputs, one_hot(&[1], 2).unwrap())])
    }

    #[test]
    fn test_weight_delta_is_minus_lr_times_gradient() {
        let model = LinearClassifier::new(3, 2, 4);
        let inputs = Tensor::from_shape_vec(&[1, 3], vec![0.5, -1.0, 2.0], false).unwrap();
        let data = loader(inputs);

        let delta = WeightDeltaSimulator
            .train(&model, &data, &MetaSgd::new(0.1), &CrossEntropyLoss, 1)
            .unwrap();
        let gradient = GradientSimulator
            .train(&model, &data, &MetaSgd::new(0.1), &CrossEntropyLoss, 1)
            .unwrap();

        assert_eq!(delta.len(), 2);
        for (d, g) in delta.iter().zip(&gradient) {
            for (&dv, &gv) in d.data().iter().zip(g.data().iter()) {
                assert_abs_diff_eq!(dv, -0.1 * gv, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_update_is_differentiable_wrt_inputs() {
        let model = LinearClassifier::new(2, 2, 0);
        let inputs = Tensor::from_shape_vec(&[1, 2], vec![0.3, 0.7], true).unwrap();
        let data = loader(inputs.clone());

        let delta = WeightDeltaSimulator
            .train(&model, &data, &MetaSgd::default(), &CrossEntropyLoss, 2)
            .unwrap();
        assert!(delta.iter().all(Tensor::requires_grad));

        // the weight update summed over classes is identically zero, so pick one column
        backward(&sum(&narrow(&delta[0], 1, 0, 1))).unwrap();
        let g = inputs.grad().unwrap();
        assert!(g.iter().all(|v| v.is_finite()));
        assert!(g.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_model_parameters_are_not_mutated() {
        let model = LinearClassifier::new(2, 2, 0);
        let before = model.parameters()[0].to_array();
        let inputs = Tensor::from_shape_vec(&[1, 2], vec![1.0, 1.0], false).unwrap();
        WeightDeltaSimulator
            .train(&model, &loader(inputs), &MetaSgd::new(1.0), &CrossEntropyLoss, 3)
            .unwrap();
        assert_eq!(model.parameters()[0].to_array(), before);
    }

    #[test]
    fn test_empty_loader_and_zero_epochs_rejected() {
        let model = LinearClassifier::new(2, 2, 0);
        let empty = DataLoader::new(Vec::new());
        assert!(matches!(
            GradientSimulator.train(&model, &empty, &MetaSgd::default(), &MseLoss, 1),
            Err(Error::EmptyLoader)
        ));
        let inputs = Tensor::zeros(&[1, 2], false);
        assert!(WeightDeltaSimulator
            .train(&model, &loader(inputs), &MetaSgd::default(), &CrossEntropyLoss, 0)
            .unwrap_err()
            .is_config_error());
    }

    #[test]
    fn test_loss_errors_propagate() {
        let model = LinearClassifier::new(2, 3, 0);
        let inputs = Tensor::zeros(&[1, 2], false);
        // two-class targets against a three-class head
        let result =
            GradientSimulator.train(&model, &loader(inputs), &MetaSgd::default(), &CrossEntropyLoss, 1);
        assert!(matches!(result, Err(Error::InvalidShape(_))));
    }
}
