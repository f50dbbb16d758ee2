//! # CIFAR-10 CNN
//!
//! Trains and evaluates a fixed-topology convolutional classifier on
//! CIFAR-10 using the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: CIFAR-10 binary loading, download, preprocessing and batching
//! - `model`: the CNN and the explicit train/eval forward mode
//! - `training`: SGD loop, evaluation, checkpointing and the end-to-end run
//! - `config`: run configuration loaded from TOML
//! - `backend`: CPU/GPU backend selection
//! - `utils`: logging, metrics, and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cifar10_cnn::backend::CpuTrainingBackend;
//! use cifar10_cnn::{run, RunConfig};
//!
//! let config = RunConfig::default();
//! let outcome = run::<CpuTrainingBackend>(&config, Default::default())?;
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;


// Re-export commonly used items for convenience
pub use config::RunConfig;
pub use dataset::{Cifar10Batch, Cifar10Dataset, Cifar10Item, CLASS_NAMES, NUM_CLASSES};
pub use model::{Cifar10Classifier, ClassifierConfig, ImageClassifier, Mode};
pub use training::{run, CheckpointStore, EvaluationSummary, RunOutcome, Trainer};
pub use utils::error::{Cifar10Error, Result};
