//! Burn `Batcher` for CIFAR-10 samples.
//!
//! Preprocessing runs item-parallel with rayon. Each training item gets its
//! own RNG derived from a per-batch seed, so results do not depend on how
//! rayon schedules the work.

use std::sync::Mutex;

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::dataset::augmentation::Preprocessor;
use crate::dataset::cifar10::Cifar10Item;

/// A batch ready for the model
#[derive(Clone, Debug)]
pub struct Cifar10Batch<B: Backend> {
    /// `[batch, 3, size, size]`, values in `[0, 1]`
    pub images: Tensor<B, 4>,
    /// `[batch]` class indices
    pub targets: Tensor<B, 1, Int>,
    /// `[batch, num_classes]` one-hot encoding of `targets`
    pub one_hot: Tensor<B, 2>,
}

/// Preprocesses a list of items and stacks them into a [`Cifar10Batch`]
pub struct Cifar10Batcher {
    preprocessor: Preprocessor,
    num_classes: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl Cifar10Batcher {
    pub fn new(preprocessor: Preprocessor, num_classes: usize, seed: u64) -> Self {
        Self {
            preprocessor,
            num_classes,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Per-item seeds for one batch, drawn from the batcher's RNG
    fn item_seeds(&self, count: usize) -> Vec<u64> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (0..count).map(|_| rng.gen()).collect()
    }
}

impl std::fmt::Debug for Cifar10Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cifar10Batcher")
            .field("image_size", &self.preprocessor.image_size())
            .field("augmenting", &self.preprocessor.is_augmenting())
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl<B: Backend> Batcher<B, Cifar10Item, Cifar10Batch<B>> for Cifar10Batcher {
    fn batch(&self, items: Vec<Cifar10Item>, device: &B::Device) -> Cifar10Batch<B> {
        let batch_size = items.len();
        let size = self.preprocessor.image_size() as usize;
        let augmenting = self.preprocessor.is_augmenting();
        let seeds = if augmenting {
            self.item_seeds(batch_size)
        } else {
            vec![0; batch_size]
        };

        let images_data: Vec<f32> = items
            .par_iter()
            .zip(seeds.par_iter())
            .flat_map_iter(|(item, &seed)| {
                if augmenting {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    self.preprocessor.preprocess(&item.image, Some(&mut rng))
                } else {
                    self.preprocessor.preprocess(&item.image, None)
                }
            })
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        let mut one_hot_data = vec![0.0f32; batch_size * self.num_classes];
        for (row, item) in items.iter().enumerate() {
            one_hot_data[row * self.num_classes + item.label] = 1.0;
        }
        let one_hot = Tensor::<B, 2>::from_floats(
            TensorData::new(one_hot_data, [batch_size, self.num_classes]),
            device,
        );

        Cifar10Batch {
            images,
            targets,
            one_hot,
        }
    }
}
