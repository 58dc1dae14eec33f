//! Composition sessions.
//!
//! A session is one recording's worth of composition. It is driven by a
//! single task: the pacing source is pulled one frame at a time, and each
//! pacing frame produces exactly one output frame. In dual-source mode the
//! background source is sampled opportunistically through at most one
//! in-flight fetch, so background frames may be skipped or repeated.
//!
//! ```text
//!   Idle ──first pacing frame──▶ Running ──stop / sink closed / pacing ended──▶ Draining ──▶ Closed
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use pipcast_common::clock::DriftMeasurement;
use pipcast_overlay_model::geometry::{compute_overlay, CoverFit};
use pipcast_overlay_model::options::CompositionConfig;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::frame::VideoFrame;
use crate::slot::FrameSlot;
use crate::source::FrameSource;
use crate::surface::DrawingSurface;

/// Lifecycle of a composition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no pacing frame seen yet.
    Idle,
    /// Producing output frames.
    Running,
    /// A terminal signal was observed; releasing held frames.
    Draining,
    /// Output ended. Nothing further is emitted.
    Closed,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The pacing source reported end-of-sequence.
    PacingEnded,
    /// The output sink closed its end.
    SinkClosed,
    /// `stop()` was requested.
    Stopped,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::PacingEnded => "pacing source ended",
            Termination::SinkClosed => "sink closed",
            Termination::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// How a session combines its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// Pacing frames drawn over background frames.
    Dual,
    /// Only the primary source; frames pass through untouched.
    PrimaryOnly,
    /// Only the secondary source; frames pass through untouched.
    SecondaryOnly,
}

impl fmt::Display for CompositionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompositionMode::Dual => "dual",
            CompositionMode::PrimaryOnly => "primary-only",
            CompositionMode::SecondaryOnly => "secondary-only",
        };
        f.write_str(s)
    }
}

/// Runtime statistics for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub mode: CompositionMode,
    pub started_at: DateTime<Utc>,
    pub termination: Option<Termination>,

    /// Output frames handed to the sink.
    pub frames_emitted: u64,

    /// Pacing frames released without producing output (termination raced
    /// them).
    pub pacing_frames_discarded: u64,

    /// Background frames pulled from the secondary source.
    pub background_frames_received: u64,

    /// Background frames replaced before they were ever drawn.
    pub background_frames_skipped: u64,

    /// Background frames that arrived after termination and were released
    /// without being held.
    pub background_frames_discarded: u64,

    /// Output frames that reused a background already drawn before.
    pub background_repeats: u64,

    /// Largest gap between a pacing timestamp and the background drawn
    /// under it, in microseconds.
    pub max_background_lag_us: i64,

    /// The secondary source ended while the session was running.
    pub background_exhausted: bool,
}

impl SessionStats {
    pub fn new(mode: CompositionMode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            termination: None,
            frames_emitted: 0,
            pacing_frames_discarded: 0,
            background_frames_received: 0,
            background_frames_skipped: 0,
            background_frames_discarded: 0,
            background_repeats: 0,
            max_background_lag_us: 0,
            background_exhausted: false,
        }
    }

    /// Share of received background frames that were never drawn, as a
    /// percentage.
    pub fn background_skip_rate(&self) -> f64 {
        if self.background_frames_received == 0 {
            return 0.0;
        }
        self.background_frames_skipped as f64 / self.background_frames_received as f64 * 100.0
    }
}

type Pull = BoxFuture<'static, (Box<dyn FrameSource>, Option<VideoFrame>)>;

/// Start pulling one frame. The source travels with the future and comes
/// back with the result, so a second pull cannot start meanwhile.
fn pull(mut source: Box<dyn FrameSource>) -> Pull {
    async move {
        let frame = source.next_frame().await;
        (source, frame)
    }
    .boxed()
}

fn sampled(mut source: Box<dyn FrameSource>) -> Box<dyn FrameSource> {
    source.sample_latest();
    source
}

/// The background source and its fetch state. `Fetching` is the in-flight
/// guard: a new fetch is only issued from `Ready`.
enum BackgroundFeed {
    Ready(Box<dyn FrameSource>),
    Fetching(Pull),
    Exhausted,
}

/// Await the in-flight background fetch, or never resolve if there is none.
async fn in_flight(feed: &mut BackgroundFeed) -> (Box<dyn FrameSource>, Option<VideoFrame>) {
    match feed {
        BackgroundFeed::Fetching(pending) => pending.await,
        _ => std::future::pending().await,
    }
}

/// Whether to keep going after a step.
enum Flow {
    Continue,
    Terminate(Termination),
}

/// Shared plumbing: output, stop token and published state.
pub(crate) struct SessionIo {
    pub(crate) output: mpsc::Sender<VideoFrame>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: watch::Sender<SessionState>,
}

impl SessionIo {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state();
        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Composition session state change");
            self.state.send_replace(next);
        }
    }

    fn is_terminating(&self) -> bool {
        matches!(self.state(), SessionState::Draining | SessionState::Closed)
    }

    /// Push one frame downstream unless a terminal signal arrives first.
    /// An unsent frame is released with the dropped send.
    async fn emit(&self, frame: VideoFrame) -> Flow {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Flow::Terminate(Termination::Stopped),
            sent = self.output.send(frame) => match sent {
                Ok(()) => Flow::Continue,
                Err(mpsc::error::SendError(frame)) => {
                    frame.release();
                    Flow::Terminate(Termination::SinkClosed)
                }
            },
        }
    }
}

/// Dual-source compositor: pacing frames drawn over the latest background.
pub struct CompositionSession {
    config: CompositionConfig,
    fallback: (u32, u32),
    surface: DrawingSurface,
    pacing: Box<dyn FrameSource>,
    background: BackgroundFeed,
    held: FrameSlot,
    io: SessionIo,
    stats: SessionStats,
}

impl CompositionSession {
    pub(crate) fn new(
        config: CompositionConfig,
        fallback: (u32, u32),
        surface: DrawingSurface,
        pacing: Box<dyn FrameSource>,
        background: Box<dyn FrameSource>,
        io: SessionIo,
    ) -> Self {
        Self {
            config,
            fallback,
            surface,
            pacing,
            background: BackgroundFeed::Ready(sampled(background)),
            held: FrameSlot::new(),
            io,
            stats: SessionStats::new(CompositionMode::Dual),
        }
    }

    /// Drive the session to completion.
    pub async fn run(self) -> SessionStats {
        let CompositionSession {
            config,
            fallback,
            surface,
            pacing,
            background,
            held,
            io,
            stats,
        } = self;
        let mut driver = Driver {
            config,
            fallback,
            surface,
            background,
            held,
            io,
            stats,
        };

        tracing::info!(
            pacing = pacing.label(),
            position = %driver.config.position,
            size = %driver.config.size,
            aspect = %driver.config.aspect,
            "Composition session starting"
        );

        let mut pacing_pull = pull(pacing);
        let termination = loop {
            let fetching = matches!(driver.background, BackgroundFeed::Fetching(_));
            tokio::select! {
                biased;
                _ = driver.io.cancel.cancelled() => break Termination::Stopped,
                _ = driver.io.output.closed() => break Termination::SinkClosed,
                (source, frame) = in_flight(&mut driver.background), if fetching => {
                    driver.on_background_fetched(source, frame);
                }
                (source, frame) = &mut pacing_pull => {
                    let Some(frame) = frame else {
                        break Termination::PacingEnded;
                    };
                    if let Flow::Terminate(reason) = driver.composite(frame).await {
                        break reason;
                    }
                    pacing_pull = pull(source);
                }
            }
        };

        // Cancels any pacing pull still in flight.
        drop(pacing_pull);
        driver.close(termination)
    }
}

/// Mutable state of a running dual session.
struct Driver {
    config: CompositionConfig,
    fallback: (u32, u32),
    surface: DrawingSurface,
    background: BackgroundFeed,
    held: FrameSlot,
    io: SessionIo,
    stats: SessionStats,
}

impl Driver {
    /// Produce one output frame from one pacing frame.
    async fn composite(&mut self, pacing: VideoFrame) -> Flow {
        if self.io.state() == SessionState::Idle {
            self.io.transition(SessionState::Running);
        }

        if self.held.is_empty() {
            // Nothing to draw behind the overlay yet: wait once for the
            // first background frame rather than emit a blank one.
            if let Flow::Terminate(reason) = self.await_first_background().await {
                pacing.release();
                self.stats.pacing_frames_discarded += 1;
                return Flow::Terminate(reason);
            }
        } else {
            self.request_background();
        }

        let (width, height) = match self.held.get() {
            Some(background) => {
                let dims = background.dimensions();
                self.surface.resize(dims.0, dims.1);
                self.surface.draw_background(background);

                let lag = DriftMeasurement {
                    reference_us: pacing.timestamp_us(),
                    measured_us: background.timestamp_us(),
                }
                .lag_us();
                self.stats.max_background_lag_us = self.stats.max_background_lag_us.max(lag);

                if self.held.mark_drawn().unwrap_or(0) > 0 {
                    self.stats.background_repeats += 1;
                }
                dims
            }
            None => {
                self.surface.resize(self.fallback.0, self.fallback.1);
                self.fallback
            }
        };

        let rect = compute_overlay(&self.config, width as f64, height as f64);
        let fit = CoverFit::compute(&rect, pacing.width(), pacing.height());
        self.surface.draw_clipped(&pacing, &fit, &rect);

        let timestamp_us = pacing.timestamp_us();
        pacing.release();

        tracing::trace!(
            timestamp_us,
            width,
            height,
            left = rect.left,
            top = rect.top,
            "Composited frame"
        );

        let output = self.surface.snapshot(timestamp_us);
        let flow = self.io.emit(output).await;
        if matches!(flow, Flow::Continue) {
            self.stats.frames_emitted += 1;
        }
        flow
    }

    /// Issue a background fetch unless one is already in flight.
    fn request_background(&mut self) {
        if let BackgroundFeed::Ready(_) = self.background {
            if let BackgroundFeed::Ready(source) =
                std::mem::replace(&mut self.background, BackgroundFeed::Exhausted)
            {
                self.background = BackgroundFeed::Fetching(pull(source));
            }
        }
    }

    async fn await_first_background(&mut self) -> Flow {
        self.request_background();
        if !matches!(self.background, BackgroundFeed::Fetching(_)) {
            return Flow::Continue;
        }

        tracing::debug!("Waiting for first background frame");
        let (source, frame) = tokio::select! {
            biased;
            _ = self.io.cancel.cancelled() => return Flow::Terminate(Termination::Stopped),
            _ = self.io.output.closed() => return Flow::Terminate(Termination::SinkClosed),
            fetched = in_flight(&mut self.background) => fetched,
        };
        self.on_background_fetched(source, frame);

        if self.held.is_empty() {
            tracing::warn!(
                width = self.fallback.0,
                height = self.fallback.1,
                "Background source ended before its first frame; compositing on a blank surface"
            );
        }
        Flow::Continue
    }

    /// Settle a completed background fetch.
    fn on_background_fetched(
        &mut self,
        mut source: Box<dyn FrameSource>,
        frame: Option<VideoFrame>,
    ) {
        // Frames the source dropped on its own were received but never drawn.
        let superseded = source.take_superseded();
        self.stats.background_frames_received += superseded;
        self.stats.background_frames_skipped += superseded;

        let Some(frame) = frame else {
            tracing::debug!(
                source = source.label(),
                "Background source ended; keeping last frame"
            );
            self.background = BackgroundFeed::Exhausted;
            self.stats.background_exhausted = true;
            return;
        };

        self.background = BackgroundFeed::Ready(source);
        self.stats.background_frames_received += 1;

        if self.io.is_terminating() {
            tracing::debug!(
                timestamp_us = frame.timestamp_us(),
                "Background frame arrived after termination; releasing"
            );
            frame.release();
            self.stats.background_frames_discarded += 1;
            return;
        }
        if self.held.store(frame) == Some(0) {
            self.stats.background_frames_skipped += 1;
        }
    }

    fn close(mut self, termination: Termination) -> SessionStats {
        self.io.transition(SessionState::Draining);

        // A fetch that already finished is settled (its frame released);
        // one still pending is cancelled.
        if let BackgroundFeed::Fetching(pending) =
            std::mem::replace(&mut self.background, BackgroundFeed::Exhausted)
        {
            if let Some((source, frame)) = pending.now_or_never() {
                self.on_background_fetched(source, frame);
            }
        }
        self.held.clear();

        self.io.transition(SessionState::Closed);
        self.stats.termination = Some(termination);
        tracing::info!(
            reason = %termination,
            frames = self.stats.frames_emitted,
            skipped = self.stats.background_frames_skipped,
            repeats = self.stats.background_repeats,
            "Composition session closed"
        );
        self.stats
    }
}

/// Single-source session: frames are forwarded untouched.
pub struct PassthroughSession {
    mode: CompositionMode,
    source: Box<dyn FrameSource>,
    io: SessionIo,
}

impl PassthroughSession {
    pub(crate) fn new(mode: CompositionMode, source: Box<dyn FrameSource>, io: SessionIo) -> Self {
        Self { mode, source, io }
    }

    pub async fn run(self) -> SessionStats {
        let PassthroughSession { mode, source, io } = self;
        let mut stats = SessionStats::new(mode);

        tracing::info!(source = source.label(), %mode, "Pass-through session starting");

        let mut next = pull(source);
        let termination = loop {
            tokio::select! {
                biased;
                _ = io.cancel.cancelled() => break Termination::Stopped,
                _ = io.output.closed() => break Termination::SinkClosed,
                (source, frame) = &mut next => {
                    let Some(frame) = frame else {
                        break Termination::PacingEnded;
                    };
                    if io.state() == SessionState::Idle {
                        io.transition(SessionState::Running);
                    }
                    if let Flow::Terminate(reason) = io.emit(frame).await {
                        break reason;
                    }
                    stats.frames_emitted += 1;
                    next = pull(source);
                }
            }
        };

        drop(next);
        io.transition(SessionState::Draining);
        io.transition(SessionState::Closed);
        stats.termination = Some(termination);
        tracing::info!(
            reason = %termination,
            frames = stats.frames_emitted,
            "Pass-through session closed"
        );
        stats
    }
}
