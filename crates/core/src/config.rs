//! Engine configuration loaded from a TOML file.
//!
//! Every section is optional; absent keys take their `Default` values, so an
//! empty file and a missing file both yield [`EngineConfig::default`].
//!
//! ```toml
//! [window]
//! title = "kiln"
//! width = 1600
//! height = 900
//!
//! [renderer]
//! present_mode = "fifo"
//! capture_extent = 256
//!
//! [scene]
//! initial = "deferred"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Upper bound on lights accepted by the lighting uniform block.
const LIGHT_CAPACITY: u32 = 16;

/// Root configuration document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub assets: AssetConfig,
    pub log: LogConfig,
    pub scene: SceneConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "kiln".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Presentation mode requested from the surface. The swapchain falls back to
/// FIFO, which every driver supports, when the preference is unavailable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer.
    pub validation: bool,
    pub present_mode: PresentModePreference,
    /// RGBA clear colour of the swapchain pass.
    pub clear_color: [f32; 4],
    /// Edge length of each square reflection capture target.
    pub capture_extent: u32,
    /// Light markers animated by the lighting scenes.
    pub max_lights: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
            clear_color: [0.01, 0.01, 0.02, 1.0],
            capture_extent: 512,
            max_lights: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory holding compiled `*.spv` modules.
    pub shader_dir: PathBuf,
    pub model_dir: PathBuf,
    pub texture_dir: PathBuf,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders/spirv"),
            model_dir: PathBuf::from("assets/models"),
            texture_dir: PathBuf::from("assets/textures"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Which scene the viewer opens with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneChoice {
    #[default]
    Forward,
    Reflection,
    Deferred,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub initial: SceneChoice,
}

impl EngineConfig {
    /// Default location checked when no path is given on the command line.
    pub const DEFAULT_PATH: &'static str = "kiln.toml";

    /// Load and validate the configuration at `path`.
    ///
    /// A missing file is not an error: defaults are returned instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(
                "No config at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window extent must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.renderer.capture_extent == 0 {
            return Err(Error::Config("capture_extent must be non-zero".into()));
        }
        if self.renderer.max_lights > LIGHT_CAPACITY {
            return Err(Error::Config(format!(
                "max_lights is {} but at most {} are supported",
                self.renderer.max_lights, LIGHT_CAPACITY
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [window]
            width = 1600

            [renderer]
            present_mode = "fifo"
            capture_extent = 256

            [scene]
            initial = "deferred"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1600);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.renderer.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.renderer.capture_extent, 256);
        assert_eq!(config.scene.initial, SceneChoice::Deferred);
        assert_eq!(config.assets, AssetConfig::default());
    }

    #[test]
    fn test_unknown_present_mode_is_rejected() {
        let err = EngineConfig::from_toml("[renderer]\npresent_mode = \"vsync\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let err = EngineConfig::from_toml("[window]\nheight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("non-zero")));
    }

    #[test]
    fn test_too_many_lights_is_rejected() {
        let err = EngineConfig::from_toml("[renderer]\nmax_lights = 17").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load("definitely/not/here/kiln.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = EngineConfig::default();
        config.scene.initial = SceneChoice::Reflection;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }
}
