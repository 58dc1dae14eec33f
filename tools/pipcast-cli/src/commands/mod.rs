pub mod compose;
pub mod config;
pub mod geometry;
pub mod preview;

use anyhow::Context;
use pipcast_common::config::AppConfig;
use pipcast_overlay_model::options::CompositionConfig;

use crate::OverlayArgs;

/// Overlay options from the command line, falling back to the
/// configuration file for anything unset.
pub fn overlay_config(app: &AppConfig, args: &OverlayArgs) -> anyhow::Result<CompositionConfig> {
    let defaults = &app.composition;
    CompositionConfig::from_strings(
        args.position.as_deref().unwrap_or(&defaults.position),
        args.size.as_deref().unwrap_or(&defaults.size),
        args.corner.as_deref().unwrap_or(&defaults.corner),
        args.aspect.as_deref().unwrap_or(&defaults.aspect),
    )
    .context("Invalid overlay options")
}

/// Parse a `WIDTHxHEIGHT` size.
pub fn parse_size(value: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("Expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = w.trim().parse().with_context(|| format!("Bad width in '{value}'"))?;
    let height: u32 = h.trim().parse().with_context(|| format!("Bad height in '{value}'"))?;
    anyhow::ensure!(width > 0 && height > 0, "Size must be non-zero, got '{value}'");
    Ok((width, height))
}
