//! Backend abstraction - Multi-backend support
//!
//! NdArray (CPU) is always compiled in. CUDA is available behind the `cuda`
//! feature and is picked automatically when an NVIDIA GPU is present.

use std::fmt;

use burn::backend::Autodiff;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// CPU backend
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPU backend
#[cfg(feature = "cuda")]
pub type GpuBackend = burn_cuda::Cuda;

/// Autodiff backend used for training on CPU
pub type CpuTrainingBackend = Autodiff<CpuBackend>;

/// Autodiff backend used for training on GPU
#[cfg(feature = "cuda")]
pub type GpuTrainingBackend = Autodiff<GpuBackend>;

/// Requested device, as written in the config file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Backend actually used for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedBackend {
    Cpu,
    #[cfg(feature = "cuda")]
    Gpu,
}

impl fmt::Display for SelectedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectedBackend::Cpu => write!(f, "NdArray (CPU)"),
            #[cfg(feature = "cuda")]
            SelectedBackend::Gpu => write!(f, "CUDA (GPU)"),
        }
    }
}

/// Resolve the preference against what is compiled in and present
pub fn select_backend(preference: DevicePreference) -> SelectedBackend {
    match preference {
        DevicePreference::Cpu => SelectedBackend::Cpu,
        DevicePreference::Gpu => gpu_or_cpu(true),
        DevicePreference::Auto => gpu_or_cpu(false),
    }
}

#[cfg(feature = "cuda")]
fn gpu_or_cpu(requested: bool) -> SelectedBackend {
    if requested || has_nvidia_gpu() {
        SelectedBackend::Gpu
    } else {
        debug!("No NVIDIA GPU detected, using CPU");
        SelectedBackend::Cpu
    }
}

#[cfg(not(feature = "cuda"))]
fn gpu_or_cpu(requested: bool) -> SelectedBackend {
    if requested {
        tracing::warn!("GPU requested but this build has no `cuda` feature, falling back to CPU");
    } else {
        debug!("Built without `cuda` feature, using CPU");
    }
    SelectedBackend::Cpu
}

#[cfg(feature = "cuda")]
fn has_nvidia_gpu() -> bool {
    std::path::Path::new("/proc/driver/nvidia/version").exists()
        || std::path::Path::new("/dev/nvidia0").exists()
        || std::process::Command::new("nvidia-smi")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}
