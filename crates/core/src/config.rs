//! Engine configuration.
//!
//! Settings are read from a TOML file at startup. Every field has a default, so
//! a partial file (or no file at all) yields a usable configuration.
//!
//! # Example
//!
//! ```
//! use ember_core::{EngineConfig, ShadowMode};
//!
//! let config: EngineConfig = toml::from_str(
//!     r#"
//!     [window]
//!     width = 1600
//!     height = 900
//!
//!     [shadow]
//!     mode = "csm"
//!     cascade_count = 4
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.window.width, 1600);
//! assert_eq!(config.shadow.mode, ShadowMode::Csm);
//! config.validate().unwrap();
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Maximum number of shadow cascades the global scene data can carry.
pub const MAX_CASCADES: u32 = 4;

/// Shadow quality mode.
///
/// `Simple` and `Pcf` render and sample a single cascade; `Csm` renders every
/// configured cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowMode {
    Off,
    Simple,
    Pcf,
    #[default]
    Csm,
}

impl ShadowMode {
    /// Number of cascades rendered in this mode given the configured total.
    pub fn active_cascades(self, configured: u32) -> u32 {
        match self {
            ShadowMode::Off => 0,
            ShadowMode::Simple | ShadowMode::Pcf => configured.min(1),
            ShadowMode::Csm => configured,
        }
    }

    /// Value written into the global scene data for the shaders.
    pub fn shader_value(self) -> u32 {
        match self {
            ShadowMode::Off => 0,
            ShadowMode::Simple => 1,
            ShadowMode::Pcf => 2,
            ShadowMode::Csm => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub mode: ShadowMode,
    pub cascade_count: u32,
    /// Width and height of each cascade layer.
    pub resolution: u32,
    /// Blend between logarithmic (1.0) and uniform (0.0) split schemes.
    pub split_lambda: f32,
    /// Multiplier applied to the light-space near/far bounds.
    pub z_multiplier: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            mode: ShadowMode::Csm,
            cascade_count: MAX_CASCADES,
            resolution: 2048,
            split_lambda: 0.5,
            z_multiplier: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub move_speed: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 70.0,
            near: 0.1,
            far: 100.0,
            move_speed: 5.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowSettings,
    pub shadow: ShadowSettings,
    pub camera: CameraSettings,
    /// Enable Vulkan validation layers.
    pub validation: bool,
    /// Directory containing compiled `.spv` shaders.
    pub shader_dir: PathBuf,
    /// glTF scene loaded at startup, if any.
    pub scene: Option<PathBuf>,
    /// Compute shaders run in order by the postprocess chain, relative to `shader_dir`.
    pub postprocess: Vec<String>,
    /// Gradient colors for the background compute effect.
    pub background_top: [f32; 4],
    pub background_bottom: [f32; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowSettings::default(),
            shadow: ShadowSettings::default(),
            camera: CameraSettings::default(),
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders/spirv"),
            scene: None,
            postprocess: Vec::new(),
            background_top: [1.0, 0.0, 0.0, 1.0],
            background_bottom: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned and a warning is
    /// logged.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the file exists but cannot be read, and
    /// [`Error::Config`] if it fails to parse or validate.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Check value ranges the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(
                "window extent must be non-zero".to_string(),
            ));
        }
        if self.shadow.cascade_count == 0 || self.shadow.cascade_count > MAX_CASCADES {
            return Err(Error::Config(format!(
                "shadow.cascade_count must be in 1..={}, got {}",
                MAX_CASCADES, self.shadow.cascade_count
            )));
        }
        if self.shadow.resolution == 0 {
            return Err(Error::Config(
                "shadow.resolution must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.shadow.split_lambda) {
            return Err(Error::Config(
                "shadow.split_lambda must be in [0, 1]".to_string(),
            ));
        }
        if self.camera.near <= 0.0 || self.camera.near >= self.camera.far {
            return Err(Error::Config(format!(
                "camera near/far must satisfy 0 < near < far, got {} / {}",
                self.camera.near, self.camera.far
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.shadow.cascade_count, 4);
        assert_eq!(config.shadow.split_lambda, 0.5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            validation = false
            [camera]
            far = 500.0
            "#,
        )
        .unwrap();

        assert!(!config.validation);
        assert_eq!(config.camera.far, 500.0);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.window.title, "Ember");
    }

    #[test]
    fn test_shadow_mode_parses_lowercase() {
        let config: EngineConfig = toml::from_str("[shadow]\nmode = \"pcf\"").unwrap();
        assert_eq!(config.shadow.mode, ShadowMode::Pcf);
    }

    #[test]
    fn test_validate_rejects_bad_cascades() {
        let mut config = EngineConfig::default();
        config.shadow.cascade_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.shadow.cascade_count = 5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_clip_planes() {
        let mut config = EngineConfig::default();
        config.camera.near = 10.0;
        config.camera.far = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_active_cascades() {
        assert_eq!(ShadowMode::Off.active_cascades(4), 0);
        assert_eq!(ShadowMode::Simple.active_cascades(4), 1);
        assert_eq!(ShadowMode::Pcf.active_cascades(4), 1);
        assert_eq!(ShadowMode::Csm.active_cascades(4), 4);
        assert_eq!(ShadowMode::Csm.active_cascades(2), 2);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = EngineConfig::load(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.window.width, 1280);
    }
}
