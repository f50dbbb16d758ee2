//! Model module: the convolutional classifier and the forward-pass mode.

pub mod cnn;

use burn::tensor::{backend::Backend, Tensor};

pub use cnn::{Cifar10Classifier, ClassifierConfig, ConvBlock};

/// Forward-pass mode, passed explicitly to every forward call.
///
/// `Train` enables dropout and uses batch statistics in batch norm
/// (updating the running statistics). `Eval` disables dropout, reads the
/// running statistics and leaves the model untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Anything that maps an image batch to per-class scores.
pub trait ImageClassifier<B: Backend> {
    /// # Shapes
    /// - images: `[batch, channels, height, width]`
    /// - output: `[batch, num_classes]`
    fn scores(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2>;
}
