//! Live overlay preview layout.
//!
//! The on-screen preview is not burned into recordings. It follows the
//! background video element's observed size, which can change at runtime,
//! and is recomputed whenever that size changes.

use serde::{Deserialize, Serialize};

use crate::geometry::{compute_overlay_with, OverlayRect, SizingPolicy, FALLBACK_CONTAINER};
use crate::layout::Layout;
use crate::options::CompositionConfig;

/// A positioned preview overlay for one container size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewOverlay {
    pub rect: OverlayRect,
    pub container_width: u32,
    pub container_height: u32,
}

/// CSS-like placement for UI clients. Offsets and sizes are percentages of
/// the container so the preview scales with the element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStyle {
    pub top: String,
    pub left: String,
    pub width: String,
    pub height: String,
    pub border_radius: String,
}

impl PreviewOverlay {
    pub fn css_style(&self) -> PreviewStyle {
        let w = self.container_width.max(1) as f64;
        let h = self.container_height.max(1) as f64;
        PreviewStyle {
            top: percentage(self.rect.top / h),
            left: percentage(self.rect.left / w),
            width: percentage(self.rect.width / w),
            height: percentage(self.rect.height / h),
            border_radius: format!("{}px", self.rect.corner_radius),
        }
    }
}

fn percentage(fraction: f64) -> String {
    format!("{:.3}%", fraction * 100.0)
}

/// Tracks the background size and keeps the preview overlay current.
#[derive(Debug, Clone)]
pub struct PreviewTracker {
    config: CompositionConfig,
    layout: Layout,
    observed: Option<(u32, u32)>,
}

impl PreviewTracker {
    pub fn new(config: CompositionConfig, layout: Layout) -> Self {
        Self {
            config,
            layout,
            observed: None,
        }
    }

    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Last observed background size, if any.
    pub fn observed_size(&self) -> Option<(u32, u32)> {
        self.observed
    }

    /// Record a resize of the background element.
    ///
    /// Returns the recomputed overlay when the size actually changed. In
    /// camera-only layout the main element shows the camera, so its size
    /// is not a background size and is ignored.
    pub fn observe_resize(&mut self, width: u32, height: u32) -> Option<PreviewOverlay> {
        if self.layout == Layout::CameraOnly || width == 0 || height == 0 {
            return None;
        }
        if self.observed == Some((width, height)) {
            return None;
        }

        tracing::debug!(width, height, "Preview background resized");
        self.observed = Some((width, height));
        Some(self.compute(width, height))
    }

    /// The screen source went away; forget its size.
    pub fn screen_removed(&mut self) {
        self.observed = None;
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
    }

    pub fn set_config(&mut self, config: CompositionConfig) {
        self.config = config;
    }

    /// The overlay to show, if any.
    ///
    /// Shown only in screen-and-camera layout with a camera present. With a
    /// screen present it waits until the screen size is known; without one
    /// it uses the fallback container.
    pub fn overlay(&self, camera_present: bool, screen_present: bool) -> Option<PreviewOverlay> {
        if self.layout != Layout::ScreenAndCamera || !camera_present {
            return None;
        }
        match (screen_present, self.observed) {
            (true, None) => None,
            (true, Some((w, h))) => Some(self.compute(w, h)),
            (false, _) => Some(self.compute(FALLBACK_CONTAINER.0, FALLBACK_CONTAINER.1)),
        }
    }

    fn compute(&self, width: u32, height: u32) -> PreviewOverlay {
        PreviewOverlay {
            rect: compute_overlay_with(
                SizingPolicy::Preview,
                &self.config,
                width as f64,
                height as f64,
            ),
            container_width: width,
            container_height: height,
        }
    }
}
