//! Model checkpointing.
//!
//! A checkpoint is one opaque file holding every parameter of the
//! classifier (weights and batch-norm running statistics) at full precision,
//! so a save/load round trip reproduces evaluation outputs exactly.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::backend::Backend,
};
use tracing::info;

use crate::model::Cifar10Classifier;
use crate::utils::error::{Cifar10Error, Result, ResultExt};

/// File extension written by the recorder
const CHECKPOINT_EXTENSION: &str = "bin";

type CheckpointRecorder = BinFileRecorder<FullPrecisionSettings>;

/// Reads and writes classifier parameters at a fixed location
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// The recorder always writes a `.bin` file, so any other extension
    /// on `path` is replaced.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().with_extension(CHECKPOINT_EXTENSION),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write all parameters, creating parent directories as needed
    pub fn save<B: Backend>(&self, model: &Cifar10Classifier<B>) -> Result<()> {
        info!("Saving checkpoint to {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        model
            .clone()
            .save_file(self.path.clone(), &CheckpointRecorder::new())
            .checkpoint_context(|| format!("Failed to save model to {}", self.path.display()))?;

        info!("Checkpoint saved");
        Ok(())
    }

    /// Restore parameters into `model`, which must have the same architecture
    pub fn load<B: Backend>(
        &self,
        model: Cifar10Classifier<B>,
        device: &B::Device,
    ) -> Result<Cifar10Classifier<B>> {
        info!("Loading checkpoint from {:?}", self.path);

        if !self.exists() {
            return Err(Cifar10Error::Checkpoint(format!(
                "Checkpoint {} does not exist",
                self.path.display()
            )));
        }

        let model = model
            .load_file(self.path.clone(), &CheckpointRecorder::new(), device)
            .checkpoint_context(|| format!("Failed to load model from {}", self.path.display()))?;

        info!("Checkpoint loaded successfully");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifierConfig, Mode};
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    use crate::test_support::backend_rng_lock;

    type TestBackend = NdArray<f32>;

    fn input() -> Tensor<TestBackend, 4> {
        let values: Vec<f32> = (0..2 * 3 * 64 * 64).map(|i| ((i % 31) as f32) / 31.0).collect();
        Tensor::from_floats(TensorData::new(values, [2, 3, 64, 64]), &Default::default())
    }

    fn eval_scores(model: &Cifar10Classifier<TestBackend>) -> Vec<f32> {
        model
            .forward(input(), Mode::Eval)
            .into_data()
            .to_vec::<f32>()
            .unwrap()
    }

    #[test]
    fn test_extension_is_normalized() {
        assert_eq!(CheckpointStore::new("model.bin").path(), Path::new("model.bin"));
        assert_eq!(CheckpointStore::new("out/weights").path(), Path::new("out/weights.bin"));
    }

    #[test]
    fn test_save_then_load_reproduces_outputs() {
        let _rng = backend_rng_lock();
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path().join("nested").join("model.bin"));
        let device = Default::default();
        let config = ClassifierConfig::new();

        let trained: Cifar10Classifier<TestBackend> = config.init(&device);
        // Move the running statistics away from their initial values.
        let _ = trained.forward(input(), Mode::Train);
        store.save(&trained).unwrap();
        assert!(store.exists());

        let fresh: Cifar10Classifier<TestBackend> = config.init(&device);
        assert_ne!(eval_scores(&trained), eval_scores(&fresh));

        let restored = store.load(fresh, &device).unwrap();
        assert_eq!(eval_scores(&trained), eval_scores(&restored));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let _rng = backend_rng_lock();
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path().join("missing.bin"));
        let model: Cifar10Classifier<TestBackend> = ClassifierConfig::new().init(&Default::default());

        let result = store.load(model, &Default::default());
        assert!(matches!(result, Err(Cifar10Error::Checkpoint(_))));
    }
}
