//! Print the live preview overlay placement.

use pipcast_common::config::AppConfig;
use pipcast_overlay_model::layout::Layout;
use pipcast_overlay_model::preview::PreviewTracker;

use super::overlay_config;
use crate::OverlayArgs;

pub fn run(
    app: &AppConfig,
    overlay: &OverlayArgs,
    layout: &str,
    observed: Option<(u32, u32)>,
    camera_present: bool,
) -> anyhow::Result<()> {
    let config = overlay_config(app, overlay)?;
    let layout: Layout = layout.parse()?;

    let mut tracker = PreviewTracker::new(config, layout);
    if let Some((w, h)) = observed {
        tracker.observe_resize(w, h);
    }

    match tracker.overlay(camera_present, observed.is_some()) {
        Some(preview) => {
            let value = serde_json::json!({
                "container": {
                    "width": preview.container_width,
                    "height": preview.container_height,
                },
                "rect": preview.rect,
                "style": preview.css_style(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("No overlay preview is shown for layout '{layout}'."),
    }
    Ok(())
}
