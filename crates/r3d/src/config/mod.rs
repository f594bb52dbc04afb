//! Configuration system
//!
//! Renderer settings and environments are plain serde structs that can be loaded
//! from and saved to TOML or RON files, selected by extension.

use serde::{Deserialize, Serialize};

use crate::render::environment::Environment;
use crate::render::frame::RenderFlags;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text, using `path` only to pick the format
    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Serialize configuration in the format matching `path`
    fn to_text(&self, path: &str) -> Result<String, ConfigError> {
        if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = self.to_text(path)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// # Renderer Configuration
///
/// Everything the renderer needs at construction time. The environment block is
/// copied into the frame context and can be replaced later through
/// `Renderer::set_environment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Internal render resolution (width, height) in pixels
    pub resolution: (u32, u32),
    /// Initial render flags
    pub flags: RenderFlags,
    /// Near cull distance used for the camera projection
    pub cull_near: f32,
    /// Far cull distance used for the camera projection
    pub cull_far: f32,
    /// Shadow map resolution used when a light enables shadows without an explicit size
    pub default_shadow_resolution: u32,
    /// Scene environment
    pub environment: Environment,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            resolution: (1280, 720),
            flags: RenderFlags::default(),
            cull_near: 0.05,
            cull_far: 4000.0,
            default_shadow_resolution: 2048,
            environment: Environment::default(),
        }
    }
}

impl RendererConfig {
    /// Create a configuration for the given internal resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: (width, height),
            ..Self::default()
        }
    }

    /// Set the initial render flags
    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Validate values that would otherwise produce degenerate GPU resources
    pub fn validate(&self) -> Result<(), String> {
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err(format!("Invalid resolution: {}x{}", self.resolution.0, self.resolution.1));
        }
        if self.cull_near <= 0.0 || self.cull_far <= self.cull_near {
            return Err(format!("Invalid cull distances: near={} far={}", self.cull_near, self.cull_far));
        }
        if self.default_shadow_resolution == 0 {
            return Err("Shadow map resolution must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip_keeps_flags() {
        let config = RendererConfig::new(640, 360)
            .with_flags(RenderFlags::FXAA | RenderFlags::OPAQUE_SORTING);
        let text = config.to_text("renderer.toml").unwrap();
        let parsed = RendererConfig::parse("renderer.toml", &text).unwrap();
        assert_eq!(parsed.resolution, (640, 360));
        assert_eq!(parsed.flags, RenderFlags::FXAA | RenderFlags::OPAQUE_SORTING);
    }

    #[test]
    fn test_ron_partial_document_uses_defaults() {
        let parsed = RendererConfig::parse("renderer.ron", "(resolution: (320, 200))").unwrap();
        assert_eq!(parsed.resolution, (320, 200));
        assert_eq!(parsed.default_shadow_resolution, 2048);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = RendererConfig::parse("renderer.ini", "").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_validation_rejects_zero_resolution() {
        assert!(RendererConfig::new(0, 10).validate().is_err());
        assert!(RendererConfig::default().validate().is_ok());
    }
}
