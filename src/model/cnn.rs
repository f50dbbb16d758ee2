//! CNN Model Architecture for CIFAR-10 Classification
//!
//! Ten convolutional blocks alternate between a pooling block
//! (conv, batch norm, ReLU, 2x2 max-pool) and a plain block
//! (conv, batch norm, ReLU, dropout). Five poolings take a 64x64 input down
//! to 2x2, so the classifier head sees `512 * 2 * 2 = 2048` features.
//!
//! Batch norm and dropout are driven by an explicit [`Mode`] instead of the
//! backend's autodiff flag, so evaluation can run on either backend.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Distribution, Tensor},
};

use crate::model::{ImageClassifier, Mode};

/// Output channels of each block, in order
const BLOCK_CHANNELS: [usize; 10] = [32, 32, 64, 64, 128, 128, 256, 256, 512, 512];

/// Spatial reduction of the feature extractor (five 2x2 poolings)
const DOWNSAMPLE: usize = 32;

const BN_EPSILON: f64 = 1e-5;
const BN_MOMENTUM: f64 = 0.1;

/// Configuration for the CIFAR-10 classifier
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Input image size (square, multiple of 32)
    #[config(default = "64")]
    pub image_size: usize,

    /// Dropout rate used in plain blocks and before the head
    #[config(default = "0.35")]
    pub dropout: f64,

    /// Width of the hidden fully connected layer
    #[config(default = "1024")]
    pub hidden_units: usize,
}

impl ClassifierConfig {
    /// Flattened feature count entering the head
    pub fn feature_size(&self) -> usize {
        let side = self.image_size / DOWNSAMPLE;
        BLOCK_CHANNELS[BLOCK_CHANNELS.len() - 1] * side * side
    }

    /// Initialize a new model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cifar10Classifier<B> {
        Cifar10Classifier::new(self, device)
    }
}

/// Conv, batch norm, ReLU, then either a max-pool or a dropout
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
    pub dropout: Option<Dropout>,
}

impl<B: Backend> ConvBlock<B> {
    /// Block ending in a 2x2 stride-2 max-pool
    pub fn pooling(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self::build(in_channels, out_channels, kernel_size, Some(pool), None, device)
    }

    /// Block ending in dropout
    pub fn plain(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let dropout = DropoutConfig::new(dropout).init();
        Self::build(in_channels, out_channels, kernel_size, None, Some(dropout), device)
    }

    fn build(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        pool: Option<MaxPool2d>,
        dropout: Option<Dropout>,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device);

        let bn = BatchNormConfig::new(out_channels)
            .with_epsilon(BN_EPSILON)
            .with_momentum(BN_MOMENTUM)
            .init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
            dropout,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: Mode) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = batch_norm(&self.bn, x, mode);
        let x = self.relu.forward(x);
        let x = match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        };

        match &self.dropout {
            Some(dropout) => apply_dropout(dropout, x, mode),
            None => x,
        }
    }
}

/// Batch normalization over `[batch, channels, h, w]`.
///
/// Train mode normalizes with the (biased) batch statistics and folds them
/// into the running statistics; Eval mode only reads the running statistics.
fn batch_norm<B: Backend>(bn: &BatchNorm<B, 2>, x: Tensor<B, 4>, mode: Mode) -> Tensor<B, 4> {
    let [batch_size, channels, height, width] = x.dims();
    let shape = [1, channels, 1, 1];

    let (mean, var) = match mode {
        Mode::Train => {
            let flat = x
                .clone()
                .swap_dims(0, 1)
                .reshape([channels, batch_size * height * width]);
            let mean = flat.clone().mean_dim(1);
            let var = flat.sub(mean.clone()).powf_scalar(2.0).mean_dim(1);
            let mean = mean.reshape([channels]);
            let var = var.reshape([channels]);

            let running_mean = bn
                .running_mean
                .value_sync()
                .mul_scalar(1.0 - BN_MOMENTUM)
                .add(mean.clone().detach().mul_scalar(BN_MOMENTUM));
            let running_var = bn
                .running_var
                .value_sync()
                .mul_scalar(1.0 - BN_MOMENTUM)
                .add(var.clone().detach().mul_scalar(BN_MOMENTUM));
            bn.running_mean.update(running_mean.detach());
            bn.running_var.update(running_var.detach());

            (mean, var)
        }
        Mode::Eval => (bn.running_mean.value(), bn.running_var.value()),
    };

    let std = var.add_scalar(BN_EPSILON).sqrt().reshape(shape);
    x.sub(mean.reshape(shape))
        .div(std)
        .mul(bn.gamma.val().reshape(shape))
        .add(bn.beta.val().reshape(shape))
}

/// Inverted dropout: zero with probability `p`, rescale survivors by `1/(1-p)`
fn apply_dropout<B: Backend, const D: usize>(
    dropout: &Dropout,
    x: Tensor<B, D>,
    mode: Mode,
) -> Tensor<B, D> {
    if mode == Mode::Eval || dropout.prob == 0.0 {
        return x;
    }

    let keep = 1.0 - dropout.prob;
    let mask = x.random_like(Distribution::Bernoulli(keep));
    x.mul(mask).div_scalar(keep)
}

/// CIFAR-10 Classifier CNN
///
/// Architecture:
/// - 10 convolutional blocks, pooling after every other one
/// - Flatten
/// - Dropout, Linear(2048, 1024), ReLU, Linear(1024, 10)
///
/// Outputs raw scores; no softmax is applied.
#[derive(Module, Debug)]
pub struct Cifar10Classifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub dropout: Dropout,
    pub fc1: Linear<B>,
    pub relu: Relu,
    pub fc2: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> Cifar10Classifier<B> {
    /// Create a new classifier from configuration
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(BLOCK_CHANNELS.len());
        let mut in_channels = config.in_channels;

        for (index, &out_channels) in BLOCK_CHANNELS.iter().enumerate() {
            let block = match index {
                0 => ConvBlock::pooling(in_channels, out_channels, 5, device),
                i if i % 2 == 0 => ConvBlock::pooling(in_channels, out_channels, 3, device),
                _ => ConvBlock::plain(in_channels, out_channels, 3, config.dropout, device),
            };
            blocks.push(block);
            in_channels = out_channels;
        }

        let dropout = DropoutConfig::new(config.dropout).init();
        let fc1 = LinearConfig::new(config.feature_size(), config.hidden_units).init(device);
        let fc2 = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            blocks,
            dropout,
            fc1,
            relu: Relu::new(),
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass
    ///
    /// # Shapes
    /// - input: `[batch, in_channels, image_size, image_size]`
    /// - output: `[batch, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x, mode);
        }

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = apply_dropout(&self.dropout, x, mode);
        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> ImageClassifier<B> for Cifar10Classifier<B> {
    fn scores(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        self.forward(images, mode)
    }
}
