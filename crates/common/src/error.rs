//! Error types shared across PipCast crates.

use std::path::PathBuf;

/// Top-level error type for PipCast operations.
#[derive(Debug, thiserror::Error)]
pub enum PipcastError {
    /// The drawing capability required for dual-source composition is
    /// unavailable. Fatal: the session never produces a frame.
    #[error("Setup error: {message}")]
    Setup { message: String },

    #[error("No video source: {message}")]
    NoVideoSource { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Composite error: {message}")]
    Composite { message: String },

    #[error("Invalid {option} value: {value:?}")]
    InvalidOption { option: &'static str, value: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PipcastError.
pub type PipcastResult<T> = Result<T, PipcastError>;

impl PipcastError {
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup {
            message: msg.into(),
        }
    }

    pub fn no_video_source(msg: impl Into<String>) -> Self {
        Self::NoVideoSource {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn composite(msg: impl Into<String>) -> Self {
        Self::Composite {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_option(option: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            value: value.into(),
        }
    }

    /// Whether this error aborted a session before any output existed.
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup { .. } | Self::NoVideoSource { .. })
    }
}
