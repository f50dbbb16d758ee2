//! End-to-end run: data, model, optional checkpoint restore, then either a
//! single validation pass or the full training schedule followed by a final
//! validation pass and an optional save.

use std::path::PathBuf;
use std::sync::Arc;

use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend, tensor::backend::Backend};
use colored::Colorize;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::RunConfig;
use crate::dataset::{
    ensure_available, AugmentationConfig, BatchLoader, Cifar10Batcher, Cifar10Dataset,
    LoaderConfig, Preprocessor, Split, CLASS_NAMES,
};
use crate::model::Cifar10Classifier;
use crate::training::checkpoint::CheckpointStore;
use crate::training::trainer::{evaluate, sgd_optimizer, EpochSummary, EvaluationSummary, Trainer};
use crate::utils::Result;

/// What a run did
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Validation only; nothing was trained or saved
    Validated(EvaluationSummary),
    Trained {
        epochs: Vec<EpochSummary>,
        validation: EvaluationSummary,
        /// Checkpoint written at the end, if saving is enabled
        saved_to: Option<PathBuf>,
    },
}

/// Seeds for every random stream of a run, derived from one base seed
#[derive(Debug, Clone, Copy)]
struct RunSeeds {
    train_shuffle: u64,
    train_augment: u64,
    validation_shuffle: u64,
}

impl RunSeeds {
    fn from_base(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            train_shuffle: rng.gen(),
            train_augment: rng.gen(),
            validation_shuffle: rng.gen(),
        }
    }
}

/// Execute one run as described by `config`
pub fn run<B: AutodiffBackend>(config: &RunConfig, device: B::Device) -> Result<RunOutcome> {
    config.validate()?;

    let base_seed = config.training.seed.unwrap_or_else(rand::random);
    let seeds = RunSeeds::from_base(base_seed);
    info!("Base seed: {}", base_seed);

    println!("{}", "Preparing CIFAR-10...".cyan());
    let batches_dir = ensure_available(&config.data.data_dir, config.data.download)?;

    let validation = Arc::new(Cifar10Dataset::load(&batches_dir, Split::Validation)?);
    log_class_distribution(&validation);
    let mut valid_loader = validation_loader::<B::InnerBackend>(
        config,
        validation,
        seeds.validation_shuffle,
        device.clone(),
    )?;

    // Weight init and dropout masks draw from the backend RNG.
    if let Some(seed) = config.training.seed {
        B::seed(seed);
    }

    println!("{}", "Creating Model...".cyan());
    let mut model: Cifar10Classifier<B> = config.model.classifier_config().init(&device);
    let store = CheckpointStore::new(&config.checkpoint.path);
    if config.checkpoint.load {
        model = store.load(model, &device)?;
    }

    if config.validate_only {
        print_evaluation_header();
        let summary = evaluate(&model.valid(), &mut valid_loader)?;
        print_evaluation_summary(&summary);
        return Ok(RunOutcome::Validated(summary));
    }

    let train = Arc::new(Cifar10Dataset::load(&batches_dir, Split::Train)?);
    log_class_distribution(&train);
    let mut train_loader = training_loader::<B>(config, train, seeds, device)?;

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Epochs:        {}", config.training.epochs);
    println!("  Batch size:    {}", config.training.batch_size);
    println!("  Learning rate: {}", config.optimizer.learning_rate);
    println!("  Momentum:      {}", config.optimizer.momentum);
    println!("  Weight decay:  {}", config.optimizer.weight_decay);
    println!("  Train samples: {}", train_loader.num_items());
    println!("  Val samples:   {}", valid_loader.num_items());
    println!();

    let optimizer = sgd_optimizer::<B, Cifar10Classifier<B>>(&config.optimizer);
    let mut trainer = Trainer::new(model, optimizer, config);
    let epochs = trainer.fit(&mut train_loader)?;

    println!("\n");
    print_evaluation_header();
    let validation = trainer.evaluate(&mut valid_loader)?;
    print_evaluation_summary(&validation);

    let saved_to = if config.checkpoint.save {
        store.save(trainer.model())?;
        println!("{} {}", "Model saved to".green(), store.path().display());
        Some(store.path().to_path_buf())
    } else {
        None
    };

    Ok(RunOutcome::Trained {
        epochs,
        validation,
        saved_to,
    })
}

fn log_class_distribution(dataset: &Cifar10Dataset) {
    let counts = dataset
        .class_distribution()
        .iter()
        .zip(CLASS_NAMES)
        .map(|(count, name)| format!("{}={}", name, count))
        .collect::<Vec<_>>()
        .join(", ");
    debug!("{} class distribution: {}", dataset.split(), counts);
}

fn training_loader<B: Backend>(
    config: &RunConfig,
    dataset: Arc<Cifar10Dataset>,
    seeds: RunSeeds,
    device: B::Device,
) -> Result<BatchLoader<B>> {
    let preprocessor =
        Preprocessor::training(config.model.image_size as u32, AugmentationConfig::default());
    let batcher = Cifar10Batcher::new(preprocessor, config.model.num_classes, seeds.train_augment);
    let loader_config = LoaderConfig {
        batch_size: config.training.batch_size,
        shuffle: true,
        num_workers: config.training.num_workers,
        seed: seeds.train_shuffle,
    };

    BatchLoader::new(dataset, batcher, loader_config, device)
}

fn validation_loader<B: Backend>(
    config: &RunConfig,
    dataset: Arc<Cifar10Dataset>,
    seed: u64,
    device: B::Device,
) -> Result<BatchLoader<B>> {
    let preprocessor = Preprocessor::validation(config.model.image_size as u32);
    let batcher = Cifar10Batcher::new(preprocessor, config.model.num_classes, seed);
    let loader_config = LoaderConfig {
        batch_size: config.data.validation_batch_size,
        shuffle: config.data.shuffle_validation,
        num_workers: config.training.num_workers,
        seed,
    };

    BatchLoader::new(dataset, batcher, loader_config, device)
}

fn print_evaluation_header() {
    println!("{}", "Evaluating model...".bold());
}

fn print_evaluation_summary(summary: &EvaluationSummary) {
    println!("{}", format_summary(summary));
}

fn format_summary(summary: &EvaluationSummary) -> String {
    format!("Loss: {:.4}\t Accuracy: {:.4}", summary.loss, summary.accuracy)
}
