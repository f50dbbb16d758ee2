//! Training and Evaluation Loop
//!
//! This module implements:
//! - Forward/backward passes with automatic differentiation
//! - Cross-entropy loss against one-hot targets
//! - SGD with momentum and weight decay
//! - Validation passes in `Eval` mode on the inner (non-autodiff) backend

use std::time::Instant;

use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use tracing::{debug, info};

use crate::config::{OptimizerSettings, RunConfig};
use crate::dataset::{BatchLoader, Cifar10Batch};
use crate::model::{Cifar10Classifier, ImageClassifier, Mode};
use crate::utils::{
    batch_accuracy, batch_progress_bar, cross_entropy_one_hot, format_duration, Cifar10Error,
    Result, RunningMetrics,
};

/// Loss and accuracy of one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOutcome {
    pub loss: f64,
    pub accuracy: f64,
}

/// Mean metrics of one training epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub batches: usize,
    pub duration_secs: f64,
}

/// Mean metrics of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub batches: usize,
}

/// SGD with momentum (no dampening) and L2 weight decay
pub fn sgd_optimizer<B, M>(settings: &OptimizerSettings) -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(settings.momentum)
                .with_dampening(0.0),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(settings.weight_decay)))
        .init::<B, M>()
}

/// Owns the model and optimizer for a training run
pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Cifar10Classifier<B>, B>,
{
    model: Cifar10Classifier<B>,
    optimizer: O,
    learning_rate: f64,
    epochs: usize,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Cifar10Classifier<B>, B>,
{
    /// Learning rate and epoch count come from `config`
    pub fn new(model: Cifar10Classifier<B>, optimizer: O, config: &RunConfig) -> Self {
        Self {
            model,
            optimizer,
            learning_rate: config.optimizer.learning_rate,
            epochs: config.training.epochs,
        }
    }

    /// One optimizer step on one batch.
    ///
    /// Gradients come from a fresh backward pass, so nothing accumulates
    /// across steps.
    pub fn train_step(&mut self, batch: &Cifar10Batch<B>) -> Result<BatchOutcome> {
        let scores = self.model.forward(batch.images.clone(), Mode::Train);
        let loss = cross_entropy_one_hot(scores.clone(), batch.one_hot.clone());

        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(Cifar10Error::Training(format!("Loss became {}", loss_value)));
        }
        let accuracy = batch_accuracy(scores, batch.targets.clone());

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(self.learning_rate, self.model.clone(), grads);

        Ok(BatchOutcome {
            loss: loss_value,
            accuracy,
        })
    }

    /// One pass over the training split. `epoch` is 1-based.
    pub fn train_epoch(&mut self, loader: &mut BatchLoader<B>, epoch: usize) -> Result<EpochSummary> {
        let start = Instant::now();
        let mut metrics = RunningMetrics::new();

        let bar = batch_progress_bar(loader.num_batches(), format!("Epoch: {}/[{}]", epoch, self.epochs));
        for batch in loader.iter() {
            let outcome = self.train_step(&batch)?;
            metrics.update(outcome.loss, outcome.accuracy);

            bar.inc(1);
            bar.set_message(format!(
                "loss={:.4}, accuracy={:.4}",
                metrics.mean_loss(),
                metrics.mean_accuracy()
            ));
        }
        bar.finish();

        let duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Epoch {}/{} done in {}: loss {:.4}, accuracy {:.4}",
            epoch,
            self.epochs,
            format_duration(duration_secs),
            metrics.mean_loss(),
            metrics.mean_accuracy()
        );

        Ok(EpochSummary {
            epoch,
            loss: metrics.mean_loss(),
            accuracy: metrics.mean_accuracy(),
            batches: metrics.batches(),
            duration_secs,
        })
    }

    /// Run every configured epoch in order
    pub fn fit(&mut self, loader: &mut BatchLoader<B>) -> Result<Vec<EpochSummary>> {
        (1..=self.epochs)
            .map(|epoch| self.train_epoch(loader, epoch))
            .collect()
    }

    /// Evaluate the current parameters on the inner backend
    pub fn evaluate(&self, loader: &mut BatchLoader<B::InnerBackend>) -> Result<EvaluationSummary> {
        evaluate(&self.model.valid(), loader)
    }

    pub fn model(&self) -> &Cifar10Classifier<B> {
        &self.model
    }
}

/// One `Eval`-mode pass over a split; never changes the model
pub fn evaluate<B, M>(model: &M, loader: &mut BatchLoader<B>) -> Result<EvaluationSummary>
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut metrics = RunningMetrics::new();

    let bar = batch_progress_bar(loader.num_batches(), "Evaluating");
    for batch in loader.iter() {
        let scores = model.scores(batch.images, Mode::Eval);
        let loss: f64 = cross_entropy_one_hot(scores.clone(), batch.one_hot)
            .into_scalar()
            .elem();
        let accuracy = batch_accuracy(scores, batch.targets);

        metrics.update(loss, accuracy);
        bar.inc(1);
    }
    bar.finish_and_clear();

    if metrics.batches() == 0 {
        return Err(Cifar10Error::Dataset("Validation split is empty".into()));
    }

    debug!("Evaluated {} batches", metrics.batches());
    Ok(EvaluationSummary {
        loss: metrics.mean_loss(),
        accuracy: metrics.mean_accuracy(),
        batches: metrics.batches(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use burn::backend::Autodiff;
    use burn::module::Param;
    use burn::nn::{Linear, LinearConfig};
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};

    use crate::dataset::{Cifar10Batcher, Cifar10Dataset, Cifar10Item, LoaderConfig, Preprocessor, Split};
    use crate::model::ClassifierConfig;
    use crate::test_support::backend_rng_lock;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    /// Scores every image as `[ln 11, 0, ..., 0]`, so class 0 has
    /// probability 11/20 and every other class 1/20.
    struct FixedScores;

    impl<B: Backend> ImageClassifier<B> for FixedScores {
        fn scores(&self, images: Tensor<B, 4>, _mode: Mode) -> Tensor<B, 2> {
            let batch_size = images.dims()[0];
            let mut row = vec![0.0f32; 10];
            row[0] = 11.0f32.ln();
            let values: Vec<f32> = row.iter().copied().cycle().take(batch_size * 10).collect();
            Tensor::from_floats(TensorData::new(values, [batch_size, 10]), &images.device())
        }
    }

    fn loader<B: Backend>(labels: &[usize], batch_size: usize, image_size: u32) -> BatchLoader<B> {
        let items = labels
            .iter()
            .map(|&label| Cifar10Item {
                image: ImageBuffer::from_pixel(32, 32, Rgb([(label * 20) as u8, 80, 160])),
                label,
            })
            .collect();
        let dataset = Arc::new(Cifar10Dataset::from_items(items, Split::Validation));
        let config = LoaderConfig {
            batch_size,
            shuffle: false,
            num_workers: 1,
            seed: 0,
        };
        let batcher = Cifar10Batcher::new(Preprocessor::validation(image_size), 10, 0);
        BatchLoader::new(dataset, batcher, config, Default::default()).unwrap()
    }

    #[test]
    fn test_evaluate_two_batches_hand_computed() {
        // Batch 1: labels [0, 0]; both correct, loss ln(20/11) each.
        // Batch 2: labels [0, 3]; one correct, losses ln(20/11) and ln(20).
        let mut loader = loader::<TestBackend>(&[0, 0, 0, 3], 2, 32);
        let summary = evaluate(&FixedScores, &mut loader).unwrap();

        let hit = (20.0f64 / 11.0).ln();
        let miss = 20.0f64.ln();
        let expected_loss = (hit + (hit + miss) / 2.0) / 2.0;

        assert_eq!(summary.batches, 2);
        assert!((summary.loss - expected_loss).abs() < 1e-4);
        assert!((summary.accuracy - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_empty_split_fails() {
        let mut loader = loader::<TestBackend>(&[], 2, 32);
        assert!(evaluate(&FixedScores, &mut loader).is_err());
    }

    #[test]
    fn test_evaluate_leaves_model_untouched() {
        let _rng = backend_rng_lock();
        let device = Default::default();
        let model: Cifar10Classifier<TestBackend> = ClassifierConfig::new().init(&device);
        let mut loader = loader::<TestBackend>(&[1, 2, 3], 2, 64);

        let first = evaluate(&model, &mut loader).unwrap();
        let second = evaluate(&model, &mut loader).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_train_epoch_updates_parameters() {
        let _rng = backend_rng_lock();
        let device = Default::default();
        let model: Cifar10Classifier<TestAutodiffBackend> = ClassifierConfig::new().init(&device);
        let before = model.fc2.weight.val().into_data().to_vec::<f32>().unwrap();

        let mut config = RunConfig::default();
        config.optimizer.learning_rate = 0.01;
        config.training.epochs = 1;
        let optimizer = sgd_optimizer::<TestAutodiffBackend, Cifar10Classifier<_>>(&config.optimizer);
        let mut trainer = Trainer::new(model, optimizer, &config);
        let mut train_loader = loader::<TestAutodiffBackend>(&[0, 1, 2, 3, 4], 2, 64);

        let summary = trainer.train_epoch(&mut train_loader, 1).unwrap();
        assert_eq!(summary.epoch, 1);
        assert_eq!(summary.batches, 3);
        assert!(summary.loss.is_finite());
        assert!((0.0..=1.0).contains(&summary.accuracy));

        let after = trainer.model().fc2.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_trainer_evaluates_on_inner_backend() {
        let _rng = backend_rng_lock();
        let device = Default::default();
        let model: Cifar10Classifier<TestAutodiffBackend> = ClassifierConfig::new().init(&device);
        let config = RunConfig::default();
        let optimizer = sgd_optimizer::<TestAutodiffBackend, Cifar10Classifier<_>>(&config.optimizer);
        let trainer = Trainer::new(model, optimizer, &config);

        let mut valid_loader = loader::<TestBackend>(&[5, 6, 7], 2, 64);
        let summary = trainer.evaluate(&mut valid_loader).unwrap();
        assert_eq!(summary.batches, 2);
        assert!(summary.loss.is_finite());
    }

    #[test]
    fn test_sgd_applies_decay_then_momentum() {
        let _rng = backend_rng_lock();
        let device = Default::default();
        let mut linear: Linear<TestAutodiffBackend> = LinearConfig::new(2, 1).with_bias(false).init(&device);
        linear.weight = Param::from_tensor(Tensor::from_floats([[10.0f32], [20.0]], &device));

        // Default momentum 0.9 and weight decay 1e-3.
        let settings = OptimizerSettings {
            learning_rate: 0.1,
            ..OptimizerSettings::default()
        };
        let mut optimizer = sgd_optimizer::<TestAutodiffBackend, Linear<_>>(&settings);
        let input = Tensor::<TestAutodiffBackend, 2>::from_floats([[1.0f32, 3.0]], &device);

        // The loss is the sum of outputs, so the raw gradient is always [1, 3].
        for _ in 0..2 {
            let loss = linear.forward(input.clone()).sum();
            let grads = GradientsParams::from_grads(loss.backward(), &linear);
            linear = optimizer.step(settings.learning_rate, linear, grads);
        }

        // Step 1: v = g + 1e-3 w0 = [1.01, 3.02], w1 = [9.899, 19.698]
        // Step 2: v = g + 1e-3 w1 + 0.9 v1 = [1.918899, 5.737698]
        //         w2 = [9.7071101, 19.1242302]
        let weights = linear.weight.val().into_data().to_vec::<f32>().unwrap();
        assert!((weights[0] - 9.707_110).abs() < 1e-4);
        assert!((weights[1] - 19.124_23).abs() < 1e-4);
    }
}
