//! Application configuration.
//!
//! Overlay options are kept as their wire strings here (`"bottom-right"`,
//! `"M"`, `"1:1"`); `pipcast-overlay-model` parses them into closed enums.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default composition settings.
    pub composition: CompositionDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default composition parameters, applied to the next recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionDefaults {
    /// Overlay anchor corner.
    pub position: String,

    /// Overlay size class (S, M, L, XL).
    pub size: String,

    /// Overlay corner rounding class (S, M, L, XL).
    pub corner: String,

    /// Overlay aspect ratio, `W:H`.
    pub aspect: String,

    /// Container width used before any background frame has arrived.
    pub fallback_width: u32,

    /// Container height used before any background frame has arrived.
    pub fallback_height: u32,

    /// Capacity of the composed output channel.
    pub output_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pipcast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            composition: CompositionDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CompositionDefaults {
    fn default() -> Self {
        Self {
            position: "bottom-right".to_string(),
            size: "M".to_string(),
            corner: "L".to_string(),
            aspect: "1:1".to_string(),
            fallback_width: 1920,
            fallback_height: 1080,
            output_capacity: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("pipcast").join("config.json")
}
