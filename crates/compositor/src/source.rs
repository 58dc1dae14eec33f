//! Frame sources.
//!
//! A source is pulled one frame at a time. Pulls are non-reentrant: the
//! `&mut self` receiver guarantees a single outstanding pull per source.

use std::collections::VecDeque;
use std::time::Duration;

use pipcast_common::clock::{FrameCadence, MonotonicClock, RateController};
use tokio::sync::mpsc;

use crate::frame::{FrameLedger, VideoFrame};

/// A live sequence of timestamped frames.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame. `None` means the source has ended and will not
    /// produce again.
    async fn next_frame(&mut self) -> Option<VideoFrame>;

    /// Short name for logs.
    fn label(&self) -> &str;

    /// Keep only the newest frame between pulls. Background sources are
    /// sampled, not consumed; sources that buffer drop stale frames.
    fn sample_latest(&mut self) {}

    /// Frames dropped in favour of newer ones since the last call.
    fn take_superseded(&mut self) -> u64 {
        0
    }
}

/// Source fed through a channel by a capture integration.
///
/// Frames are delivered in order by default. Once [`FrameSource::sample_latest`]
/// is called, each pull waits for one frame and then skips ahead to the
/// newest queued one, releasing everything older.
#[derive(Debug)]
pub struct ChannelSource {
    label: String,
    rx: mpsc::Receiver<VideoFrame>,
    latest_only: bool,
    superseded: u64,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it. The source ends once
    /// every sender is dropped and buffered frames are drained.
    pub fn channel(label: impl Into<String>, capacity: usize) -> (mpsc::Sender<VideoFrame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                label: label.into(),
                rx,
                latest_only: false,
                superseded: 0,
            },
        )
    }
}

#[async_trait::async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Option<VideoFrame> {
        let mut frame = self.rx.recv().await?;
        if self.latest_only {
            while let Ok(newer) = self.rx.try_recv() {
                let stale = std::mem::replace(&mut frame, newer);
                tracing::trace!(
                    source = %self.label,
                    stale_us = stale.timestamp_us(),
                    "Dropping superseded frame"
                );
                stale.release();
                self.superseded += 1;
            }
        }
        Some(frame)
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn sample_latest(&mut self) {
        self.latest_only = true;
    }

    fn take_superseded(&mut self) -> u64 {
        std::mem::take(&mut self.superseded)
    }
}

/// What a scripted source does once its frames run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Report end-of-sequence.
    End,
    /// Stay open without producing, like an idle live device.
    Idle,
}

/// Source that replays a prepared list of frames, each after an optional
/// delay.
#[derive(Debug)]
pub struct ScriptedSource {
    label: String,
    frames: VecDeque<(Duration, VideoFrame)>,
    end: ScriptEnd,
}

impl ScriptedSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            frames: VecDeque::new(),
            end: ScriptEnd::End,
        }
    }

    /// Queue a frame available immediately.
    pub fn push(self, frame: VideoFrame) -> Self {
        self.push_after(Duration::ZERO, frame)
    }

    /// Queue a frame that becomes available `delay` after it is pulled for.
    pub fn push_after(mut self, delay: Duration, frame: VideoFrame) -> Self {
        self.frames.push_back((delay, frame));
        self
    }

    pub fn then(mut self, end: ScriptEnd) -> Self {
        self.end = end;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait::async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Option<VideoFrame> {
        let delay = match self.frames.front() {
            Some((delay, _)) => *delay,
            None => match self.end {
                ScriptEnd::End => return None,
                ScriptEnd::Idle => std::future::pending().await,
            },
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.frames.pop_front().map(|(_, frame)| frame)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Generator of solid-colour frames at a fixed cadence.
///
/// The colour cycles through a small palette so consecutive frames differ.
#[derive(Debug)]
pub struct SyntheticSource {
    label: String,
    cadence: FrameCadence,
    width: u32,
    height: u32,
    palette: Vec<[u8; 4]>,
    limit: Option<u64>,
    produced: u64,
    ledger: Option<FrameLedger>,
    pacing: Option<(RateController, MonotonicClock)>,
}

impl SyntheticSource {
    pub fn new(label: impl Into<String>, width: u32, height: u32, cadence: FrameCadence) -> Self {
        Self {
            label: label.into(),
            cadence,
            width,
            height,
            palette: vec![[32, 32, 32, 255]],
            limit: None,
            produced: 0,
            ledger: None,
            pacing: None,
        }
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 4]>) -> Self {
        if !palette.is_empty() {
            self.palette = palette;
        }
        self
    }

    /// End after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Register every produced frame with `ledger`.
    pub fn tracked(mut self, ledger: &FrameLedger) -> Self {
        self.ledger = Some(ledger.clone());
        self
    }

    /// Produce frames in real time instead of as fast as they are pulled.
    pub fn live(mut self) -> Self {
        self.pacing = Some((RateController::new(self.cadence), MonotonicClock::start()));
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

#[async_trait::async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Option<VideoFrame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }

        if let Some((rate, clock)) = self.pacing.as_mut() {
            loop {
                let now = clock.elapsed_us();
                if rate.should_tick(now) {
                    break;
                }
                let wait = rate.until_next_us(now).max(1) as u64;
                tokio::time::sleep(Duration::from_micros(wait)).await;
            }
        }

        let index = self.produced;
        let colour = self.palette[(index as usize) % self.palette.len()];
        let frame = VideoFrame::solid(
            self.width,
            self.height,
            self.cadence.timestamp_us(0, index),
            colour,
        );
        self.produced += 1;

        Some(match &self.ledger {
            Some(ledger) => frame.tracked(ledger),
            None => frame,
        })
    }

    fn label(&self) -> &str {
        &self.label
    }
}
