//! PipCast Common Utilities
//!
//! Shared infrastructure for all PipCast crates:
//! - Error types and result aliases
//! - Frame cadence and drift utilities for two-source composition
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
