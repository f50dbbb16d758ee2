//! Dataset module: CIFAR-10 loading, preprocessing and batching.
//!
//! - [`cifar10`]: binary record parsing and the idempotent download step
//! - [`augmentation`]: per-image preprocessing pipelines
//! - [`batcher`]: Burn `Batcher` producing tensors
//! - [`loader`]: shuffled, batched iteration over a split

pub mod augmentation;
pub mod batcher;
pub mod cifar10;
pub mod loader;

pub use augmentation::{AugmentationConfig, Preprocessor};
pub use batcher::{Cifar10Batch, Cifar10Batcher};
pub use cifar10::{ensure_available, Cifar10Dataset, Cifar10Item, Split, CLASS_NAMES, NUM_CLASSES};
pub use loader::{BatchLoader, Batches, LoaderConfig};
