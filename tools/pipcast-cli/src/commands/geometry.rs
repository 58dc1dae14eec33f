//! Print overlay rectangles for a container size.

use pipcast_common::config::AppConfig;
use pipcast_overlay_model::geometry::{compute_overlay_with, OverlayRect, SizingPolicy};

use super::overlay_config;
use crate::OverlayArgs;

pub fn run(
    app: &AppConfig,
    overlay: &OverlayArgs,
    width: u32,
    height: u32,
    json: bool,
) -> anyhow::Result<()> {
    anyhow::ensure!(width > 0 && height > 0, "Container must be non-empty");
    let config = overlay_config(app, overlay)?;

    let recording = compute_overlay_with(SizingPolicy::Recording, &config, width as f64, height as f64);
    let preview = compute_overlay_with(SizingPolicy::Preview, &config, width as f64, height as f64);

    if json {
        let value = serde_json::json!({
            "container": { "width": width, "height": height },
            "config": config,
            "recording": recording,
            "preview": preview,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Container: {width}x{height}");
    println!(
        "Overlay: {} {} corner {} aspect {}",
        config.position, config.size, config.corner, config.aspect
    );
    println!();
    print_rect("Recording", &recording, width, height);
    print_rect("Preview", &preview, width, height);
    Ok(())
}

fn print_rect(name: &str, rect: &OverlayRect, width: u32, height: u32) {
    println!("{name}:");
    println!("  Left: {:.1}  Top: {:.1}", rect.left, rect.top);
    println!("  Size: {:.1}x{:.1}", rect.width, rect.height);
    println!("  Corner radius: {}px", rect.corner_radius);
    if !rect.is_within(width as f64, height as f64) {
        println!("  [WARN] Overlay extends outside the container");
    }
    println!();
}
