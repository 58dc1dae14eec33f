//! Video frames and release accounting.
//!
//! A [`VideoFrame`] is a move-only handle: it cannot be cloned, and
//! releasing it consumes it, so a frame is released exactly once and never
//! read afterwards. Frames can be tracked by a [`FrameLedger`], which
//! records every acquisition and release and flags anything unbalanced.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use image::{Rgba, RgbaImage};
use pipcast_common::error::{PipcastError, PipcastResult};
use serde::Serialize;

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One decoded RGBA image with a presentation timestamp.
pub struct VideoFrame {
    id: FrameId,
    timestamp_us: i64,
    image: RgbaImage,
    ledger: Option<FrameLedger>,
}

impl VideoFrame {
    /// Wrap tightly packed RGBA pixels.
    pub fn new(width: u32, height: u32, timestamp_us: i64, pixels: Vec<u8>) -> PipcastResult<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(PipcastError::source(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} RGBA",
                pixels.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            PipcastError::source(format!("{width}x{height} RGBA frame does not fit its buffer"))
        })?;
        Ok(Self::from_image(image, timestamp_us))
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, timestamp_us: i64, rgba: [u8; 4]) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, Rgba(rgba)), timestamp_us)
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: RgbaImage, timestamp_us: i64) -> Self {
        Self {
            id: FrameId::next(),
            timestamp_us,
            image,
            ledger: None,
        }
    }

    /// Register this frame with a ledger; its release will be recorded there.
    pub fn tracked(mut self, ledger: &FrameLedger) -> Self {
        if let Some(previous) = self.ledger.take() {
            // Moving between ledgers counts as a release in the old one.
            previous.record_release(self.id);
        }
        ledger.record_acquire(self.id);
        self.ledger = Some(ledger.clone());
        self
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// The RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|px| px.0)
    }

    /// Release the frame. Equivalent to dropping it; spelled out where a
    /// frame's lifetime ends on purpose.
    pub fn release(self) {}
}

impl Drop for VideoFrame {
    fn drop(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            ledger.record_release(self.id);
        }
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("id", &self.id)
            .field("timestamp_us", &self.timestamp_us)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("tracked", &self.ledger.is_some())
            .finish()
    }
}

/// An ownership rule broken by a tracked frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "frame", rename_all = "snake_case")]
pub enum LedgerViolation {
    /// A frame was registered twice.
    DuplicateAcquire(FrameId),
    /// A frame was released after it had already been released.
    DoubleRelease(FrameId),
    /// A frame the ledger never saw was released.
    UnknownRelease(FrameId),
}

/// Snapshot of a ledger's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub acquired: usize,
    pub released: usize,
    pub outstanding: Vec<FrameId>,
    pub violations: Vec<LedgerViolation>,
}

impl LedgerReport {
    /// Every acquired frame was released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.outstanding.is_empty() && self.violations.is_empty()
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    acquired: HashSet<FrameId>,
    released: HashSet<FrameId>,
    violations: Vec<LedgerViolation>,
}

/// Shared acquisition/release record for tracked frames.
#[derive(Debug, Clone, Default)]
pub struct FrameLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_acquire(&self, id: FrameId) {
        let mut state = self.lock();
        if !state.acquired.insert(id) {
            tracing::error!(frame = %id, "Frame registered twice");
            state.violations.push(LedgerViolation::DuplicateAcquire(id));
        }
    }

    /// Record that a frame was released. Called automatically when a
    /// tracked frame is dropped.
    pub fn record_release(&self, id: FrameId) {
        let mut state = self.lock();
        if !state.acquired.contains(&id) {
            tracing::error!(frame = %id, "Release of untracked frame");
            state.violations.push(LedgerViolation::UnknownRelease(id));
        } else if !state.released.insert(id) {
            tracing::error!(frame = %id, "Frame released twice");
            state.violations.push(LedgerViolation::DoubleRelease(id));
        }
    }

    /// Whether a tracked frame is still live.
    pub fn is_live(&self, id: FrameId) -> bool {
        let state = self.lock();
        state.acquired.contains(&id) && !state.released.contains(&id)
    }

    pub fn report(&self) -> LedgerReport {
        let state = self.lock();
        let mut outstanding: Vec<FrameId> = state
            .acquired
            .difference(&state.released)
            .copied()
            .collect();
        outstanding.sort();
        LedgerReport {
            acquired: state.acquired.len(),
            released: state.released.len(),
            outstanding,
            violations: state.violations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_buffer_length() {
        assert!(VideoFrame::new(2, 2, 0, vec![0; 16]).is_ok());
        assert!(VideoFrame::new(2, 2, 0, vec![0; 15]).is_err());
    }

    #[test]
    fn solid_frame_pixels() {
        let frame = VideoFrame::solid(3, 2, 42, [1, 2, 3, 255]);
        assert_eq!(frame.pixels().len(), 24);
        assert_eq!(frame.pixel(2, 1), Some([1, 2, 3, 255]));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.timestamp_us(), 42);
    }

    #[test]
    fn from_image_keeps_pixels() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(1, 0, Rgba([9, 8, 7, 255]));
        let frame = VideoFrame::from_image(image, 3);
        assert_eq!(frame.dimensions(), (2, 1));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(frame.pixel(1, 0), Some([9, 8, 7, 255]));
    }

    #[test]
    fn ids_are_unique() {
        let a = VideoFrame::solid(1, 1, 0, [0; 4]);
        let b = VideoFrame::solid(1, 1, 0, [0; 4]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn ledger_records_release_on_drop() {
        let ledger = FrameLedger::new();
        let frame = VideoFrame::solid(1, 1, 0, [0; 4]).tracked(&ledger);
        let id = frame.id();
        assert!(ledger.is_live(id));
        assert_eq!(ledger.report().outstanding, vec![id]);

        frame.release();
        assert!(!ledger.is_live(id));
        assert!(ledger.report().is_balanced());
    }

    #[test]
    fn ledger_flags_double_and_unknown_release() {
        let ledger = FrameLedger::new();
        let frame = VideoFrame::solid(1, 1, 0, [0; 4]).tracked(&ledger);
        let id = frame.id();
        drop(frame);
        ledger.record_release(id);

        let stray = FrameId(u64::MAX);
        ledger.record_release(stray);

        let report = ledger.report();
        assert_eq!(
            report.violations,
            vec![
                LedgerViolation::DoubleRelease(id),
                LedgerViolation::UnknownRelease(stray)
            ]
        );
        assert!(!report.is_balanced());
    }

    #[test]
    fn retracking_moves_between_ledgers() {
        let first = FrameLedger::new();
        let second = FrameLedger::new();
        let frame = VideoFrame::solid(1, 1, 0, [0; 4]).tracked(&first).tracked(&second);
        assert!(first.report().is_balanced());
        assert_eq!(second.report().outstanding.len(), 1);
        drop(frame);
        assert!(second.report().is_balanced());
    }
}
