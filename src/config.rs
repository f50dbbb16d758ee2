//! Run configuration.
//!
//! A `RunConfig` is built once at startup (defaults, optionally overridden
//! by a TOML file) and passed by reference into the data, model and
//! training layers. Every key is optional in the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::DevicePreference;
use crate::model::ClassifierConfig;
use crate::utils::error::{Cifar10Error, Result};

/// Complete configuration for one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelSettings,
    pub optimizer: OptimizerSettings,
    pub training: TrainingSettings,
    pub data: DataSettings,
    pub checkpoint: CheckpointSettings,
    /// Run one validation pass and stop, without training or saving
    pub validate_only: bool,
    pub device: DevicePreference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub in_channels: usize,
    pub num_classes: usize,
    /// Side length images are resized to before entering the network
    pub image_size: usize,
    pub dropout: f64,
    pub hidden_units: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            in_channels: 3,
            num_classes: 10,
            image_size: 64,
            dropout: 0.35,
            hidden_units: 1024,
        }
    }
}

impl ModelSettings {
    /// Burn model config matching these settings
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::new()
            .with_in_channels(self.in_channels)
            .with_num_classes(self.num_classes)
            .with_image_size(self.image_size)
            .with_dropout(self.dropout)
            .with_hidden_units(self.hidden_units)
    }
}

/// SGD hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            learning_rate: 1e-5,
            momentum: 0.9,
            weight_decay: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    /// Worker threads used to preprocess each batch
    pub num_workers: usize,
    /// Seed for shuffling, augmentation and the backend RNG; random when absent
    pub seed: Option<u64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 32,
            num_workers: 2,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub data_dir: PathBuf,
    /// Fetch the archive when the extracted batches are missing
    pub download: bool,
    pub validation_batch_size: usize,
    pub shuffle_validation: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            download: true,
            validation_batch_size: 32,
            shuffle_validation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub path: PathBuf,
    /// Restore parameters from `path` before running
    pub load: bool,
    /// Write parameters to `path` after training
    pub save: bool,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model.bin"),
            load: false,
            save: true,
        }
    }
}

impl RunConfig {
    /// Read a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        load_toml_config(path)
    }

    /// Reject values no run could ever use
    pub fn validate(&self) -> Result<()> {
        if self.training.batch_size == 0 || self.data.validation_batch_size == 0 {
            return Err(Cifar10Error::Config("batch size must be > 0".into()));
        }
        if self.training.epochs == 0 && !self.validate_only {
            return Err(Cifar10Error::Config("epochs must be > 0".into()));
        }
        if self.training.num_workers == 0 {
            return Err(Cifar10Error::Config("num_workers must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(Cifar10Error::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.model.dropout
            )));
        }
        if self.model.image_size == 0 || self.model.image_size % 32 != 0 {
            return Err(Cifar10Error::Config(format!(
                "image_size must be a positive multiple of 32, got {}",
                self.model.image_size
            )));
        }
        if self.model.num_classes == 0 {
            return Err(Cifar10Error::Config("num_classes must be > 0".into()));
        }
        if self.optimizer.learning_rate <= 0.0 {
            return Err(Cifar10Error::Config("learning_rate must be > 0".into()));
        }
        Ok(())
    }
}

/// Deserialize any TOML config file
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| Cifar10Error::Config(format!("Failed to read config {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| Cifar10Error::Config(format!("Failed to parse config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.num_workers, 2);
        assert_eq!(config.optimizer.learning_rate, 1e-5);
        assert_eq!(config.optimizer.momentum, 0.9);
        assert_eq!(config.model.image_size, 64);
        assert_eq!(config.checkpoint.path, PathBuf::from("model.bin"));
        assert!(!config.validate_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            validate_only = true

            [training]
            epochs = 2

            [checkpoint]
            load = true
            "#,
        )
        .unwrap();

        assert!(config.validate_only);
        assert!(config.checkpoint.load);
        assert_eq!(config.training.epochs, 2);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.model.dropout, 0.35);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[data]\ndata_dir = \"/tmp/cifar\"\ndownload = false").unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.data.data_dir, PathBuf::from("/tmp/cifar"));
        assert!(!config.data.download);
    }

    #[test]
    fn test_from_missing_file() {
        let result = RunConfig::from_file(Path::new("/nonexistent/cifar10.toml"));
        assert!(matches!(result, Err(Cifar10Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RunConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.model.image_size = 48;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.model.dropout = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_config_mirrors_settings() {
        let settings = ModelSettings {
            image_size: 32,
            num_classes: 4,
            ..ModelSettings::default()
        };
        let config = settings.classifier_config();
        assert_eq!(config.image_size, 32);
        assert_eq!(config.num_classes, 4);
        assert_eq!(config.dropout, 0.35);
    }
}
