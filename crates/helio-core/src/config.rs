use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level Helio runtime configuration, loaded from helio.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelioConfig {
    #[serde(default)]
    pub cuda: CudaConfig,
}

/// CUDA backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CudaConfig {
    /// Code-generation target architecture (e.g. "sm_86"), overriding the
    /// value derived from the device's compute capability.
    pub gpu_arch: Option<String>,
    /// PTX generator executable invoked on an artifact-cache miss.
    pub ptxgen: Option<String>,
    /// Kernel artifact cache directory.
    pub cache_dir: Option<String>,
}

impl HelioConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

impl CudaConfig {
    /// Effective architecture override. `HELIO_CUDA_GPU_ARCH` in the
    /// environment takes precedence over the config file.
    pub fn arch_override(&self) -> Option<String> {
        std::env::var("HELIO_CUDA_GPU_ARCH")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.gpu_arch.clone())
    }
}
