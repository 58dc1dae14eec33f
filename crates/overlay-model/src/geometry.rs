//! Overlay geometry.
//!
//! Maps composition options and a container size to a resolved pixel
//! rectangle with a corner radius. Two sizing policies exist and are kept
//! distinct:
//!
//! - [`SizingPolicy::Recording`] sizes the overlay burned into recorded
//!   frames: a fraction of the container width, a 10 px margin, and radii
//!   `{S:10, M:20, L:30, XL:50}`.
//! - [`SizingPolicy::Preview`] sizes the on-screen preview: a 400 px base
//!   box stretched by the aspect ratio and scaled by size class, a 40 px
//!   margin, and radii `{S:10, M:15, L:24, XL:40}`.
//!
//! All functions here are pure.

use serde::{Deserialize, Serialize};

use crate::options::{CompositionConfig, SizeClass};

/// Container size assumed before the background dimensions are known.
pub const FALLBACK_CONTAINER: (u32, u32) = (1920, 1080);

/// Margin between the recorded overlay and the container edges.
pub const RECORDING_MARGIN_PX: f64 = 10.0;

/// Side of the preview base box before aspect and scale are applied.
pub const PREVIEW_BASE_PX: f64 = 400.0;

/// Margin between the preview overlay and the container edges.
pub const PREVIEW_MARGIN_PX: f64 = 40.0;

/// Resolved overlay rectangle in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub corner_radius: f64,
}

impl OverlayRect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Width divided by height.
    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    /// Whether the rectangle lies inside `[0, w] × [0, h]`.
    pub fn is_within(&self, container_width: f64, container_height: f64) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.right() <= container_width
            && self.bottom() <= container_height
    }

    /// Corner radius actually drawn. Radii larger than half a side shrink
    /// to fit, as a canvas `roundRect` does.
    pub fn effective_radius(&self) -> f64 {
        self.corner_radius
            .min(self.width / 2.0)
            .min(self.height / 2.0)
            .max(0.0)
    }

    /// Whether a point lies inside the rounded rectangle.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if x < self.left || x > self.right() || y < self.top || y > self.bottom() {
            return false;
        }

        let r = self.effective_radius();
        if r <= 0.0 {
            return true;
        }

        // Distance to the nearest corner circle center, only inside the
        // corner squares.
        let cx = if x < self.left + r {
            self.left + r
        } else if x > self.right() - r {
            self.right() - r
        } else {
            return true;
        };
        let cy = if y < self.top + r {
            self.top + r
        } else if y > self.bottom() - r {
            self.bottom() - r
        } else {
            return true;
        };

        let dx = x - cx;
        let dy = y - cy;
        dx * dx + dy * dy <= r * r
    }
}

/// Destination box for drawing a source image so that it covers a
/// rectangle while keeping its own aspect ratio. Parts that overflow the
/// rectangle are clipped by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CoverFit {
    /// Fit a `src_width × src_height` image over `rect`, centered.
    ///
    /// When the rectangle is wider than the source the width is matched
    /// and the height overflows; otherwise the height is matched.
    pub fn compute(rect: &OverlayRect, src_width: u32, src_height: u32) -> Self {
        let src_aspect = if src_height == 0 {
            1.0
        } else {
            src_width as f64 / src_height as f64
        };

        let (width, height) = if rect.width / rect.height > src_aspect {
            (rect.width, rect.width / src_aspect)
        } else {
            (rect.height * src_aspect, rect.height)
        };

        Self {
            x: rect.left + (rect.width - width) / 2.0,
            y: rect.top + (rect.height - height) / 2.0,
            width,
            height,
        }
    }
}

/// Which call site's sizing rules to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizingPolicy {
    /// Overlay burned into recorded frames.
    #[default]
    Recording,
    /// Live on-screen overlay preview.
    Preview,
}

impl SizingPolicy {
    /// Corner radius in pixels for a rounding class.
    pub fn corner_radius(self, corner: SizeClass) -> f64 {
        match (self, corner) {
            (SizingPolicy::Recording, SizeClass::Small) => 10.0,
            (SizingPolicy::Recording, SizeClass::Medium) => 20.0,
            (SizingPolicy::Recording, SizeClass::Large) => 30.0,
            (SizingPolicy::Recording, SizeClass::ExtraLarge) => 50.0,
            (SizingPolicy::Preview, SizeClass::Small) => 10.0,
            (SizingPolicy::Preview, SizeClass::Medium) => 15.0,
            (SizingPolicy::Preview, SizeClass::Large) => 24.0,
            (SizingPolicy::Preview, SizeClass::ExtraLarge) => 40.0,
        }
    }

    /// Margin between the overlay and the container edges.
    pub fn margin(self) -> f64 {
        match self {
            SizingPolicy::Recording => RECORDING_MARGIN_PX,
            SizingPolicy::Preview => PREVIEW_MARGIN_PX,
        }
    }

    /// Overlay width and height for a container width.
    fn overlay_size(self, config: &CompositionConfig, container_width: f64) -> (f64, f64) {
        match self {
            SizingPolicy::Recording => {
                let width = container_width * recording_width_ratio(config.size);
                (width, width / config.aspect.value())
            }
            SizingPolicy::Preview => {
                let scale = preview_scale(config.size);
                let aspect = config.aspect.value();
                let (width, height) = if aspect >= 1.0 {
                    (PREVIEW_BASE_PX * aspect, PREVIEW_BASE_PX)
                } else {
                    (PREVIEW_BASE_PX, PREVIEW_BASE_PX / aspect)
                };
                (width * scale, height * scale)
            }
        }
    }
}

/// Fraction of the container width taken by a recorded overlay.
pub fn recording_width_ratio(size: SizeClass) -> f64 {
    match size {
        SizeClass::Small => 0.10,
        SizeClass::Medium => 0.15,
        SizeClass::Large => 0.20,
        SizeClass::ExtraLarge => 0.25,
    }
}

/// Scale applied to the preview base box.
pub fn preview_scale(size: SizeClass) -> f64 {
    match size {
        SizeClass::Small => 0.7,
        SizeClass::Medium => 0.9,
        SizeClass::Large => 1.0,
        SizeClass::ExtraLarge => 1.5,
    }
}

/// Overlay rectangle for recorded frames.
///
/// The size follows the container width alone and the result is not
/// clamped: a tall overlay on a short, wide container extends past the
/// edge opposite its anchor.
pub fn compute_overlay(
    config: &CompositionConfig,
    container_width: f64,
    container_height: f64,
) -> OverlayRect {
    compute_overlay_with(
        SizingPolicy::Recording,
        config,
        container_width,
        container_height,
    )
}

/// Overlay rectangle under an explicit sizing policy.
pub fn compute_overlay_with(
    policy: SizingPolicy,
    config: &CompositionConfig,
    container_width: f64,
    container_height: f64,
) -> OverlayRect {
    let (width, height) = policy.overlay_size(config, container_width);
    let margin = policy.margin();

    let left = if config.position.is_left() {
        margin
    } else {
        container_width - width - margin
    };
    let top = if config.position.is_top() {
        margin
    } else {
        container_height - height - margin
    };

    OverlayRect {
        top,
        left,
        width,
        height,
        corner_radius: policy.corner_radius(config.corner),
    }
}
