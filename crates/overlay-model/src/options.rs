//! Composition options: overlay corner, size class, corner rounding and
//! aspect ratio.
//!
//! Every option has a closed set of values. The wire strings used by UI
//! clients and config files (`"bottom-right"`, `"M"`, `"16:9"`) parse into
//! these types at the boundary.

use std::fmt;
use std::str::FromStr;

use pipcast_common::config::CompositionDefaults;
use pipcast_common::error::{PipcastError, PipcastResult};
use serde::{Deserialize, Serialize};

/// Corner the overlay is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl OverlayPosition {
    pub const ALL: [OverlayPosition; 4] = [
        OverlayPosition::TopLeft,
        OverlayPosition::TopRight,
        OverlayPosition::BottomLeft,
        OverlayPosition::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayPosition::TopLeft => "top-left",
            OverlayPosition::TopRight => "top-right",
            OverlayPosition::BottomLeft => "bottom-left",
            OverlayPosition::BottomRight => "bottom-right",
        }
    }

    /// Parse a position string, treating unknown or empty input as
    /// bottom-right.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            if !value.trim().is_empty() {
                tracing::warn!(value, "Unknown overlay position, using bottom-right");
            }
            OverlayPosition::default()
        })
    }

    pub fn is_top(&self) -> bool {
        matches!(self, OverlayPosition::TopLeft | OverlayPosition::TopRight)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, OverlayPosition::TopLeft | OverlayPosition::BottomLeft)
    }
}

impl FromStr for OverlayPosition {
    type Err = PipcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "top-left" => Ok(OverlayPosition::TopLeft),
            "top-right" => Ok(OverlayPosition::TopRight),
            "bottom-left" => Ok(OverlayPosition::BottomLeft),
            "bottom-right" => Ok(OverlayPosition::BottomRight),
            other => Err(PipcastError::invalid_option("position", other)),
        }
    }
}

impl fmt::Display for OverlayPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// T-shirt size class used for both overlay size and corner rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SizeClass {
    #[serde(rename = "S")]
    Small,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Large,
    #[serde(rename = "XL")]
    ExtraLarge,
}

impl SizeClass {
    pub const ALL: [SizeClass; 4] = [
        SizeClass::Small,
        SizeClass::Medium,
        SizeClass::Large,
        SizeClass::ExtraLarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "S",
            SizeClass::Medium => "M",
            SizeClass::Large => "L",
            SizeClass::ExtraLarge => "XL",
        }
    }
}

impl FromStr for SizeClass {
    type Err = PipcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "S" | "s" => Ok(SizeClass::Small),
            "M" | "m" => Ok(SizeClass::Medium),
            "L" | "l" => Ok(SizeClass::Large),
            "XL" | "xl" => Ok(SizeClass::ExtraLarge),
            other => Err(PipcastError::invalid_option("size class", other)),
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overlay aspect ratio, written `W:H`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    width: f64,
    height: f64,
}

impl AspectRatio {
    pub const SQUARE: AspectRatio = AspectRatio {
        width: 1.0,
        height: 1.0,
    };

    /// Create a ratio from its two terms. Both must be finite and positive.
    pub fn new(width: f64, height: f64) -> PipcastResult<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(PipcastError::invalid_option(
                "aspect ratio",
                format!("{width}:{height}"),
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width_term(&self) -> f64 {
        self.width
    }

    pub fn height_term(&self) -> f64 {
        self.height
    }

    /// Width divided by height.
    pub fn value(&self) -> f64 {
        self.width / self.height
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl FromStr for AspectRatio {
    type Err = PipcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PipcastError::invalid_option("aspect ratio", s);
        let (w, h) = s.trim().split_once(':').ok_or_else(invalid)?;
        let width: f64 = w.trim().parse().map_err(|_| invalid())?;
        let height: f64 = h.trim().parse().map_err(|_| invalid())?;
        Self::new(width, height).map_err(|_| invalid())
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = PipcastError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Overlay settings for one composition session.
///
/// Immutable once a session starts; edits apply to the next recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositionConfig {
    pub position: OverlayPosition,
    pub size: SizeClass,
    pub corner: SizeClass,
    pub aspect: AspectRatio,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            position: OverlayPosition::BottomRight,
            size: SizeClass::Medium,
            corner: SizeClass::Large,
            aspect: AspectRatio::SQUARE,
        }
    }
}

impl CompositionConfig {
    /// Build a config from UI/config-file strings.
    ///
    /// The position falls back to bottom-right; the other options must be
    /// valid.
    pub fn from_strings(
        position: &str,
        size: &str,
        corner: &str,
        aspect: &str,
    ) -> PipcastResult<Self> {
        Ok(Self {
            position: OverlayPosition::parse_lenient(position),
            size: size.parse()?,
            corner: corner.parse()?,
            aspect: aspect.parse()?,
        })
    }

    pub fn from_defaults(defaults: &CompositionDefaults) -> PipcastResult<Self> {
        Self::from_strings(
            &defaults.position,
            &defaults.size,
            &defaults.corner,
            &defaults.aspect,
        )
    }
}
