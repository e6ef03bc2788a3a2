//! End-to-end tests for the Inverting Gradients attack

use invertir::attack::{
    AttackState, GradientInversionAttack, InvertingConfig, InvertingGradients, InvertingParams,
    LrSchedule, Modality,
};
use invertir::data::{Batch, DataLoader, ImageExtension, Normalization, TextExtension};
use invertir::fl::{
    one_hot, BagOfTokensClassifier, CrossEntropyLoss, GradientSimulator, LinearClassifier,
    MetaLoss, MetaModel, MetaOptimizer, MetaSgd, TrainingSimulator, WeightDeltaSimulator,
};
use invertir::optim::hpo::{FixedTrial, ParameterValue, RandomTrial};
use invertir::{Error, Tensor};

fn image_loader() -> DataLoader {
    let images = Tensor::from_shape_vec(
        &[2, 1, 2, 2],
        vec![0.1, 0.9, 0.4, 0.6, 0.8, 0.2, 0.3, 0.7],
        false,
    )
    .expect("shape should match data");
    let labels = one_hot(&[0, 2], 3).expect("labels should be in range");
    DataLoader::new(vec![Batch::new(images, labels)])
}

fn image_attack(params: InvertingParams) -> InvertingGradients {
    let config = InvertingConfig::new(
        params,
        Box::new(MetaSgd::default()),
        Box::new(CrossEntropyLoss),
        Box::new(ImageExtension::new(3)),
    )
    .expect("config should be valid");
    InvertingGradients::new(
        Box::new(LinearClassifier::new(4, 3, 11)),
        image_loader(),
        Box::new(WeightDeltaSimulator),
        Normalization::scalar(0.5, 0.25).expect("std should be positive"),
        config,
    )
    .expect("attack should prepare")
}

fn text_attack(params: InvertingParams) -> InvertingGradients {
    let mut tokens = vec![0.0; 12];
    tokens[1] = 1.0;
    tokens[4] = 2.0;
    tokens[6 + 4] = 1.0;
    let inputs = Tensor::from_shape_vec(&[2, 6], tokens, false).expect("shape should match data");
    let loader = DataLoader::new(vec![Batch::new(
        inputs,
        one_hot(&[1, 0], 2).expect("labels should be in range"),
    )]);
    let config = InvertingConfig::new(
        InvertingParams {
            modality: Modality::Text,
            ..params
        },
        Box::new(MetaSgd::new(0.05)),
        Box::new(CrossEntropyLoss),
        Box::new(TextExtension::new(5)),
    )
    .expect("config should be valid");
    InvertingGradients::new(
        Box::new(BagOfTokensClassifier::new(6, 3, 2, 2)),
        loader,
        Box::new(GradientSimulator),
        Normalization::identity(),
        config,
    )
    .expect("attack should prepare")
}

fn iterations(at_iterations: usize) -> InvertingParams {
    InvertingParams {
        at_iterations,
        ..Default::default()
    }
}

fn losses(attack: &mut InvertingGradients) -> Vec<f32> {
    attack
        .run()
        .expect("attack should start")
        .map(|step| step.expect("step should succeed").result.loss)
        .collect()
}

#[test]
fn test_yields_exactly_at_iterations_items() {
    let mut attack = image_attack(iterations(7));
    let steps: Vec<_> = attack
        .run()
        .expect("attack should start")
        .collect::<Result<_, _>>()
        .expect("all steps should succeed");
    assert_eq!(steps.len(), 7);
    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step.iteration, i);
        assert_eq!(step.result.iteration, i);
        assert_eq!(step.snapshot.len(), 1);
        assert_eq!(step.snapshot[0].shape(), &[2, 1, 2, 2]);
    }
}

#[test]
fn test_image_losses_non_negative_and_best_not_worse() {
    let mut attack = image_attack(iterations(3));
    let losses = losses(&mut attack);
    assert_eq!(losses.len(), 3);
    assert!(losses.iter().all(|&l| l >= 0.0 && l.is_finite()));
    assert!(attack.best().loss() <= losses[0]);
    assert!(attack.best().snapshot().is_some());
}

#[test]
fn test_best_loss_is_monotone() {
    let mut attack = image_attack(iterations(12));
    let mut previous = f32::INFINITY;
    for step in attack.run().expect("attack should start") {
        let step = step.expect("step should succeed");
        assert!(step.result.best_loss <= previous);
        assert!(step.result.best_loss <= step.result.loss);
        previous = step.result.best_loss;
    }
}

#[test]
fn test_image_candidate_clamped_to_pixel_range() {
    let mut attack = image_attack(iterations(4));
    for step in attack.run().expect("attack should start") {
        let step = step.expect("step should succeed");
        // snapshots are denormalized, so the data range is [0, 1]
        assert!(step.snapshot[0].iter().all(|&v| (-1e-5..=1.0 + 1e-5).contains(&v)));
        assert!(step.result.psnr.is_some());
    }
}

#[test]
fn test_image_step_uses_sign_gradient() {
    let mut attack = image_attack(iterations(2));
    let mut run = attack.run().expect("attack should start");
    run.next()
        .expect("first step should exist")
        .expect("step should succeed");
    let grads = run.candidate_gradients();
    let grad = grads[0].as_ref().expect("candidate should have a gradient");
    assert!(grad.iter().all(|&g| g == 1.0 || g == -1.0 || g == 0.0));
}

#[test]
fn test_text_step_keeps_raw_gradient() {
    let mut attack = text_attack(iterations(2));
    let mut run = attack.run().expect("attack should start");
    let step = run
        .next()
        .expect("first step should exist")
        .expect("step should succeed");
    assert!(step.result.psnr.is_none());
    assert!(step.result.loss >= 0.0);
    let grads = run.candidate_gradients();
    let grad = grads[0].as_ref().expect("candidate should have a gradient");
    assert!(grad.iter().any(|&g| g != 0.0 && g.abs() != 1.0));
}

#[test]
fn test_text_candidate_initialized_on_used_tokens() {
    let attack = text_attack(iterations(1));
    let candidate = attack.reconstruction().snapshot();
    for row in candidate[0].outer_iter() {
        for (token, &value) in row.iter().enumerate() {
            if token == 1 || token == 4 {
                assert!((0.0..1.0).contains(&value));
            } else {
                assert_eq!(value, 0.0);
            }
        }
    }
}

#[test]
fn test_reset_reproduces_run_exactly() {
    let mut attack = image_attack(iterations(5));
    let first = losses(&mut attack);
    attack.reset().expect("reset should succeed");
    let second = losses(&mut attack);
    attack.reset().expect("reset should succeed");
    let third = losses(&mut attack);

    assert_eq!(first.len(), 5);
    assert_eq!(
        first.iter().map(|l| l.to_bits()).collect::<Vec<_>>(),
        second.iter().map(|l| l.to_bits()).collect::<Vec<_>>()
    );
    assert_eq!(
        second.iter().map(|l| l.to_bits()).collect::<Vec<_>>(),
        third.iter().map(|l| l.to_bits()).collect::<Vec<_>>()
    );
}

#[test]
fn test_exhausted_attack_requires_reset() {
    let mut attack = image_attack(iterations(2));
    assert_eq!(losses(&mut attack).len(), 2);
    assert_eq!(attack.state(), AttackState::Idle);
    assert!(matches!(attack.run(), Err(Error::AttackExhausted)));

    attack.reset().expect("reset should succeed");
    assert!(attack.best().is_empty());
    assert_eq!(losses(&mut attack).len(), 2);
}

#[test]
fn test_early_drop_releases_gradients() {
    let mut attack = image_attack(iterations(10));
    {
        let mut run = attack.run().expect("attack should start");
        run.next()
            .expect("first step should exist")
            .expect("step should succeed");
        run.next()
            .expect("second step should exist")
            .expect("step should succeed");
    }
    assert_eq!(attack.state(), AttackState::Prepared);
    assert!(attack.reconstruction().gradients().iter().all(Option::is_none));
    assert!(attack.model().parameters().iter().all(|p| p.grad().is_none()));
    assert_eq!(attack.best().iteration().map(|i| i < 2), Some(true));
}

#[test]
fn test_client_gradient_is_detached_and_model_untouched() {
    let attack = image_attack(iterations(1));
    assert!(attack.client_gradient().iter().all(|g| !g.requires_grad() && g.is_leaf()));
    let before: Vec<_> = attack.model().parameters().iter().map(Tensor::to_array).collect();
    let mut attack = attack;
    losses(&mut attack);
    let after: Vec<_> = attack.model().parameters().iter().map(Tensor::to_array).collect();
    assert_eq!(before, after);
}

#[test]
fn test_learning_rate_follows_schedule() {
    let mut attack = image_attack(InvertingParams {
        at_iterations: 8,
        attack_lr: 1.0,
        lr_schedule: LrSchedule::MultiStep {
            milestones: vec![0.5],
            gamma: 0.1,
        },
        ..Default::default()
    });
    let rates: Vec<f32> = attack
        .run()
        .expect("attack should start")
        .map(|step| step.expect("step should succeed").result.learning_rate)
        .collect();
    assert!(rates[..4].iter().all(|&lr| (lr - 1.0).abs() < 1e-6));
    assert!(rates[4..].iter().all(|&lr| (lr - 0.1).abs() < 1e-6));
}

#[test]
fn test_median_pooling_runs_on_interval() {
    let snapshots = |median_pooling: bool| {
        let mut attack = image_attack(InvertingParams {
            at_iterations: 4,
            median_pooling,
            median_pool_interval: 2,
            ..Default::default()
        });
        attack
            .run()
            .expect("attack should start")
            .map(|step| step.expect("step should succeed").snapshot)
            .collect::<Vec<_>>()
    };
    let pooled = snapshots(true);
    let plain = snapshots(false);
    assert_eq!(pooled.len(), 4);

    // iteration 0 is not on the interval, iteration 1 is
    assert_eq!(pooled[0], plain[0]);
    assert_ne!(pooled[1], plain[1]);
}

#[test]
fn test_suggest_parameters_fixed_trial() {
    let mut attack = image_attack(iterations(1));
    let mut trial = FixedTrial::new().with("total_variation", ParameterValue::Float(0.01));
    attack
        .suggest_parameters(&mut trial)
        .expect("suggestion should be in range");
    assert!((attack.config().params().tv_reg - 0.01).abs() < 1e-9);

    let mut out_of_range = FixedTrial::new().with("total_variation", ParameterValue::Float(0.5));
    assert!(matches!(
        attack.suggest_parameters(&mut out_of_range),
        Err(Error::Hpo(_))
    ));
}

#[test]
fn test_suggest_parameters_random_trial() {
    let mut attack = image_attack(iterations(1));
    let mut trial = RandomTrial::new(0, 17);
    attack
        .suggest_parameters(&mut trial)
        .expect("suggestion should succeed");
    let tv_reg = attack.config().params().tv_reg;
    assert!((1e-6..=1e-1).contains(&tv_reg));
    assert!(trial.trial().config.contains_key("total_variation"));
}

#[test]
fn test_description_metadata() {
    let attack = image_attack(iterations(1));
    let description = attack.description();
    assert_eq!(description.title, "Inverting gradients");
    assert!(description.reference.contains("Neurips, 2020"));
}

struct FailingSimulator;

impl TrainingSimulator for FailingSimulator {
    fn train(
        &self,
        model: &dyn MetaModel,
        loader: &DataLoader,
        optimizer: &dyn MetaOptimizer,
        loss_fn: &dyn MetaLoss,
        epochs: usize,
    ) -> invertir::Result<Vec<Tensor>> {
        // Only the candidate loader carries inputs with gradient tracking
        if loader.iter().any(|batch| batch.inputs.requires_grad()) {
            return Err(Error::Simulation("replay diverged".into()));
        }
        GradientSimulator.train(model, loader, optimizer, loss_fn, epochs)
    }

    fn name(&self) -> &'static str {
        "Failing"
    }
}

#[test]
fn test_simulator_error_propagates() {
    let config = InvertingConfig::new(
        iterations(3),
        Box::new(MetaSgd::default()),
        Box::new(CrossEntropyLoss),
        Box::new(ImageExtension::new(0)),
    )
    .expect("config should be valid");
    let mut attack = InvertingGradients::new(
        Box::new(LinearClassifier::new(4, 3, 1)),
        image_loader(),
        Box::new(FailingSimulator),
        Normalization::identity(),
        config,
    )
    .expect("client gradient should compute");

    let items: Vec<_> = attack.run().expect("attack should start").collect();
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(Error::Simulation(_))));
    assert_eq!(attack.state(), AttackState::Idle);
}

#[test]
fn test_mismatched_normalization_is_rejected() {
    let config = InvertingConfig::new(
        iterations(1),
        Box::new(MetaSgd::default()),
        Box::new(CrossEntropyLoss),
        Box::new(ImageExtension::new(0)),
    )
    .expect("config should be valid");
    let result = InvertingGradients::new(
        Box::new(LinearClassifier::new(4, 3, 1)),
        image_loader(),
        Box::new(WeightDeltaSimulator),
        Normalization::new(vec![0.5, 0.5, 0.5], vec![0.2, 0.2, 0.2]).expect("stats should be valid"),
        config,
    );
    assert!(result.err().map(|e| e.is_config_error()).unwrap_or(false));
}
