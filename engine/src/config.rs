//! Startup configuration for the viewer.

use std::path::{Path, PathBuf};

use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_ENV_VAR: &str = "MODEL_VIEWER_CONFIG";
/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "model-viewer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid sample count {0}, expected a power of two between 1 and 64.")]
    SampleCount(u32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Model Viewer".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Where the model comes from and how it is placed on import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub offset: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/models/viking_room.obj"),
            offset: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enables the Khronos validation layer and the debug messenger.
    pub validation: bool,
    /// Requested MSAA sample count, clamped to what the device supports.
    pub sample_count: u32,
    pub cull_back_faces: bool,
    pub texture_path: PathBuf,
    pub window: WindowConfig,
    pub model: ModelConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            sample_count: 2,
            cull_back_faces: false,
            texture_path: PathBuf::from("assets/textures/viking_room.png"),
            window: WindowConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads the file named by `MODEL_VIEWER_CONFIG`, else `model-viewer.toml`,
    /// else falls back to defaults when neither exists.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if path.exists() {
            info!("Loading configuration from `{}`.", path.display());
            Self::load(&path)
        } else {
            debug!("No configuration at `{}`, using defaults.", path.display());
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_count.is_power_of_two() || self.sample_count > 64 {
            return Err(ConfigError::SampleCount(self.sample_count));
        }
        Ok(())
    }
}
