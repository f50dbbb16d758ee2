//! Sequential batch loader.
//!
//! Yields batches of a fixed size (the last one may be shorter), in dataset
//! order or in a fresh random order for every pass. Each batch is
//! preprocessed on a dedicated rayon pool of `num_workers` threads before it
//! is handed to the caller; only one batch is in flight at a time.

use std::sync::Arc;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::backend::Backend,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::dataset::batcher::{Cifar10Batch, Cifar10Batcher};
use crate::dataset::cifar10::{Cifar10Dataset, Cifar10Item};
use crate::utils::error::{Cifar10Error, Result};

/// Loader settings for one split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub shuffle: bool,
    pub num_workers: usize,
    pub seed: u64,
}

pub struct BatchLoader<B: Backend> {
    dataset: Arc<Cifar10Dataset>,
    batcher: Cifar10Batcher,
    config: LoaderConfig,
    rng: ChaCha8Rng,
    pool: ThreadPool,
    device: B::Device,
}

impl<B: Backend> BatchLoader<B> {
    pub fn new(
        dataset: Arc<Cifar10Dataset>,
        batcher: Cifar10Batcher,
        config: LoaderConfig,
        device: B::Device,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Cifar10Error::Config("batch size must be > 0".into()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_workers.max(1))
            .thread_name(|i| format!("cifar10-worker-{}", i))
            .build()
            .map_err(|e| Cifar10Error::Dataset(format!("Failed to start worker pool: {}", e)))?;

        Ok(Self {
            dataset,
            batcher,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            pool,
            device,
        })
    }

    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    /// Batches per pass, counting a short final batch
    pub fn num_batches(&self) -> usize {
        self.num_items().div_ceil(self.config.batch_size)
    }

    /// Start a new pass over the dataset
    pub fn iter(&mut self) -> Batches<'_, B> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            indices.shuffle(&mut self.rng);
        }

        Batches {
            loader: self,
            indices,
            cursor: 0,
        }
    }

    fn load(&self, indices: &[usize]) -> Cifar10Batch<B> {
        let items: Vec<Cifar10Item> = indices
            .iter()
            .filter_map(|&index| self.dataset.get(index))
            .collect();

        self.pool.install(|| {
            Batcher::<B, Cifar10Item, Cifar10Batch<B>>::batch(&self.batcher, items, &self.device)
        })
    }
}

/// One pass over a [`BatchLoader`]
pub struct Batches<'a, B: Backend> {
    loader: &'a BatchLoader<B>,
    indices: Vec<usize>,
    cursor: usize,
}

impl<B: Backend> Iterator for Batches<'_, B> {
    type Item = Cifar10Batch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }

        let end = (self.cursor + self.loader.config.batch_size).min(self.indices.len());
        let batch = self.loader.load(&self.indices[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.indices.len() - self.cursor).div_ceil(self.loader.config.batch_size);
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for Batches<'_, B> {}
