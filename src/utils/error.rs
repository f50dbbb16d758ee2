//! Error Handling Module
//!
//! Defines the error type shared by the dataset, model and training layers.
//! Uses thiserror for the variants; the binary wraps everything in anyhow.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for CIFAR-10 classifier operations
#[derive(Error, Debug)]
pub enum Cifar10Error {
    /// Error with the on-disk dataset (missing files, bad records)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error fetching or unpacking the dataset archive
    #[error("Download error: {0}")]
    Download(String),

    /// Raw pixel buffer could not be turned into an image
    #[error("Invalid image in '{0}' at record {1}")]
    Image(PathBuf, usize),

    /// Error saving or restoring parameters
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, Cifar10Error>;

/// Extension trait for adding context to foreign errors
pub trait ResultExt<T> {
    /// Map the error into a dataset error prefixed with `msg`
    fn dataset_context(self, msg: &str) -> Result<T>;

    /// Map the error into a checkpoint error, building the message lazily
    fn checkpoint_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    fn dataset_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| Cifar10Error::Dataset(format!("{}: {:?}", msg, e)))
    }

    fn checkpoint_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Cifar10Error::Checkpoint(format!("{}: {:?}", f(), e)))
    }
}
