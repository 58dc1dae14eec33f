//! Recording layouts.
//!
//! A layout decides which captured sources take part in a recording. The
//! camera is the pacing source and is drawn as the overlay; the screen is
//! the background.

use std::fmt;
use std::str::FromStr;

use pipcast_common::error::PipcastError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    ScreenOnly,
    CameraOnly,
    #[default]
    ScreenAndCamera,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::ScreenOnly => "screenOnly",
            Layout::CameraOnly => "cameraOnly",
            Layout::ScreenAndCamera => "screenAndCamera",
        }
    }

    pub fn uses_camera(&self) -> bool {
        !matches!(self, Layout::ScreenOnly)
    }

    pub fn uses_screen(&self) -> bool {
        !matches!(self, Layout::CameraOnly)
    }
}

impl FromStr for Layout {
    type Err = PipcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "screenOnly" | "screen-only" => Ok(Layout::ScreenOnly),
            "cameraOnly" | "camera-only" => Ok(Layout::CameraOnly),
            "screenAndCamera" | "screen-and-camera" => Ok(Layout::ScreenAndCamera),
            other => Err(PipcastError::invalid_option("layout", other)),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sources a recording receives, after applying the layout.
#[derive(Debug)]
pub struct SelectedSources<T> {
    /// Camera; drives output cadence and is drawn as the overlay.
    pub pacing: Option<T>,
    /// Screen; drawn as the background.
    pub background: Option<T>,
}

/// Drop the sources the layout excludes. Excluded sources are returned to
/// the caller untouched so they stay alive for preview.
pub fn select_sources<T>(
    layout: Layout,
    camera: Option<T>,
    screen: Option<T>,
) -> (SelectedSources<T>, Vec<T>) {
    let mut excluded = Vec::new();

    let pacing = match camera {
        Some(camera) if !layout.uses_camera() => {
            excluded.push(camera);
            None
        }
        other => other,
    };
    let background = match screen {
        Some(screen) if !layout.uses_screen() => {
            excluded.push(screen);
            None
        }
        other => other,
    };

    (SelectedSources { pacing, background }, excluded)
}
