// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub shaders: ShaderConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Clear".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Paths to the compiled SPIR-V stages
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Treat "no GPU qualifies" as fatal instead of falling back to the first one
    pub require_capable_device: bool,
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

/// Where the active configuration came from
///
/// Loading happens before the logger exists, so the outcome is kept here and
/// reported once logging is up.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Defaults(anyhow::Error),
}

impl ConfigSource {
    pub fn report(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Defaults(e) => {
                log::warn!("Failed to load config: {:#}. Using defaults.", e)
            }
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();
        if !path.exists() {
            return (Config::default(), ConfigSource::Missing(path.to_path_buf()));
        }
        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Defaults(e)),
        }
    }

    /// Load configuration from a specific path; a missing file yields defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Get the configured log level, `Info` when unrecognised
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            eprintln!(
                "Unknown log level '{}', defaulting to info",
                self.debug.log_level
            );
            log::LevelFilter::Info
        })
    }

    /// Validation is only ever enabled in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/triangle.vert.spv"));
        assert!(!config.graphics.require_capable_device);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 1024

            [graphics]
            require_capable_device = true

            [debug]
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan Clear");
        assert!(config.graphics.require_capable_device);
        assert!(config.debug.validation_layers);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut config = Config::default();
        config.debug.log_level = "chatty".to_string();
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.shaders.fragment, PathBuf::from("shaders/triangle.frag.spv"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("clear-renderer-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = \"x\"\n").unwrap();

        assert!(Config::load_from_path(&path).is_err());

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "Vulkan Clear");
        match source {
            ConfigSource::Defaults(e) => assert!(format!("{:#}", e).contains("parse")),
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let (_, source) = Config::load_or_default("does/not/exist.toml");
        assert!(matches!(source, ConfigSource::Missing(_)));
    }
}
