//! Off-screen RGBA drawing surface.
//!
//! The surface is resized for every composite, the background is stretched
//! across it, and the overlay is scaled to its cover-fit box and blended
//! through a rounded-rectangle clip. Scaling is nearest-neighbour.

use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use pipcast_common::error::{PipcastError, PipcastResult};
use pipcast_overlay_model::geometry::{CoverFit, OverlayRect};

use crate::frame::VideoFrame;

/// Largest side a surface may be acquired for.
pub const MAX_SURFACE_SIDE: u32 = 16_384;

/// Source of drawing surfaces for dual-source sessions.
///
/// Acquisition failure is fatal to a session: it is reported before any
/// frame is produced.
pub trait SurfaceProvider: Send + Sync {
    fn acquire(&self) -> PipcastResult<DrawingSurface>;
}

/// Software rasterizer surfaces.
#[derive(Debug, Clone, Copy)]
pub struct RasterSurfaceProvider {
    max_side: u32,
}

impl RasterSurfaceProvider {
    pub fn new() -> Self {
        Self {
            max_side: MAX_SURFACE_SIDE,
        }
    }

    /// Limit the side length surfaces may grow to.
    pub fn with_max_side(max_side: u32) -> Self {
        Self { max_side }
    }
}

impl Default for RasterSurfaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceProvider for RasterSurfaceProvider {
    fn acquire(&self) -> PipcastResult<DrawingSurface> {
        if self.max_side == 0 {
            return Err(PipcastError::setup("raster surfaces are disabled (max side is 0)"));
        }
        Ok(DrawingSurface::new(self.max_side))
    }
}

/// RGBA pixel buffer owned by one compositor.
pub struct DrawingSurface {
    max_side: u32,
    image: RgbaImage,
}

impl std::fmt::Debug for DrawingSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawingSurface")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

impl DrawingSurface {
    /// An empty (0×0) surface.
    pub fn new(max_side: u32) -> Self {
        Self {
            max_side,
            image: RgbaImage::new(0, 0),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Resize and clear to transparent black. Sides are clamped to the
    /// provider's limit.
    pub fn resize(&mut self, width: u32, height: u32) {
        let width = width.min(self.max_side);
        let height = height.min(self.max_side);
        if (width, height) != self.image.dimensions() {
            tracing::trace!(width, height, "Resizing drawing surface");
            self.image = RgbaImage::new(width, height);
        } else {
            self.fill([0, 0, 0, 0]);
        }
    }

    /// Fill the whole surface with one colour.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(rgba);
        }
    }

    /// Draw `frame` stretched over the whole surface.
    ///
    /// The surface is cleared beforehand, so the background replaces its
    /// contents.
    pub fn draw_background(&mut self, frame: &VideoFrame) {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 || frame.width() == 0 || frame.height() == 0 {
            return;
        }
        if frame.dimensions() == (width, height) {
            self.image.clone_from(frame.image());
        } else {
            self.image = imageops::resize(frame.image(), width, height, FilterType::Nearest);
        }
    }

    /// Draw `frame` scaled into `dest`, clipped to the rounded `clip`
    /// rectangle.
    pub fn draw_clipped(&mut self, frame: &VideoFrame, dest: &CoverFit, clip: &OverlayRect) {
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }
        let scaled_w = dest.width.round();
        let scaled_h = dest.height.round();
        if scaled_w < 1.0 || scaled_h < 1.0 {
            return;
        }
        let scaled = imageops::resize(
            frame.image(),
            scaled_w as u32,
            scaled_h as u32,
            FilterType::Nearest,
        );
        let origin_x = dest.x.round() as i64;
        let origin_y = dest.y.round() as i64;

        // Only pixels inside the clip's bounding box can be touched.
        let x_start = clip.left.max(0.0).floor() as u32;
        let y_start = clip.top.max(0.0).floor() as u32;
        let x_end = (clip.right().max(0.0).ceil() as u32).min(self.image.width());
        let y_end = (clip.bottom().max(0.0).ceil() as u32).min(self.image.height());

        for y in y_start..y_end {
            let sy = y as i64 - origin_y;
            if sy < 0 || sy >= scaled.height() as i64 {
                continue;
            }
            for x in x_start..x_end {
                let sx = x as i64 - origin_x;
                if sx < 0 || sx >= scaled.width() as i64 {
                    continue;
                }
                if !clip.contains(x as f64 + 0.5, y as f64 + 0.5) {
                    continue;
                }
                let src = *scaled.get_pixel(sx as u32, sy as u32);
                let dst = self.image.get_pixel_mut(x, y);
                match src.0[3] {
                    0 => {}
                    255 => *dst = src,
                    _ => dst.blend(&src),
                }
            }
        }
    }

    /// Copy the surface into a new frame stamped with `timestamp_us`.
    pub fn snapshot(&self, timestamp_us: i64) -> VideoFrame {
        VideoFrame::from_image(self.image.clone(), timestamp_us)
    }
}
