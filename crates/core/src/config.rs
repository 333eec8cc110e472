//! Renderer configuration loaded from TOML.
//!
//! Every field has a default, so a partial file (or no file at all) yields a
//! usable configuration.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [gpu]
//! enable_validation = true
//! present_mode = "mailbox"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Presentation mode preference. The swapchain falls back to FIFO when the
/// preferred mode is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    /// Low-latency triple buffering
    #[default]
    Mailbox,
    /// Vsync, always available
    Fifo,
    /// No vsync, may tear
    Immediate,
}

/// Window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "G-Buffer Renderer".to_string(),
        }
    }
}

/// Device and presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Enable the Khronos validation layer and debug messenger.
    pub enable_validation: bool,
    pub present_mode: PresentModePreference,
    /// Where the pipeline cache blob is loaded from and saved to.
    pub pipeline_cache_path: Option<PathBuf>,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
            pipeline_cache_path: Some(PathBuf::from("pipeline_cache.bin")),
            shader_dir: PathBuf::from("shaders/spirv"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: crate::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete renderer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub gpu: GpuConfig,
    pub log: LogConfig,
}

impl RendererConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, and
    /// [`Error::Config`] if it is not valid TOML for this schema.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the configuration as pretty-printed TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml(
            r#"
            [window]
            width = 1920

            [gpu]
            present_mode = "fifo"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1920);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.gpu.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.gpu.shader_dir, PathBuf::from("shaders/spirv"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = RendererConfig::from_toml("[window]\nwidth = \"wide\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = RendererConfig::load("does/not/exist/renderer.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "renderer_config_test_{}.toml",
            std::process::id()
        ));
        let mut config = RendererConfig::default();
        config.window.title = "saved".to_string();
        config.gpu.enable_validation = !config.gpu.enable_validation;

        config.save(&path).unwrap();
        let loaded = RendererConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
