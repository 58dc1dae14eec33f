//! Composition entry point.
//!
//! [`compose_streams`] is called once per recording start. It picks the
//! session mode from which sources are present, acquires a drawing surface
//! for dual-source sessions, and spawns the session driver.

use pipcast_common::config::AppConfig;
use pipcast_common::error::{PipcastError, PipcastResult};
use pipcast_overlay_model::geometry::FALLBACK_CONTAINER;
use pipcast_overlay_model::options::CompositionConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::frame::VideoFrame;
use crate::session::{
    CompositionMode, CompositionSession, PassthroughSession, SessionIo, SessionState, SessionStats,
};
use crate::source::FrameSource;
use crate::surface::SurfaceProvider;

/// An audio track attached to the composed output. The compositor never
/// inspects or modifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub label: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            label: label.into(),
            sample_rate,
            channels,
        }
    }
}

/// Per-session composition settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    pub config: CompositionConfig,

    /// Container size used until the first background frame is held.
    pub fallback_container: (u32, u32),

    /// Output frames buffered before the driver waits for the sink.
    pub output_capacity: usize,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            config: CompositionConfig::default(),
            fallback_container: FALLBACK_CONTAINER,
            output_capacity: 8,
        }
    }
}

impl ComposeOptions {
    pub fn new(config: CompositionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Options from the `composition` section of the application config.
    pub fn from_app_config(app: &AppConfig) -> PipcastResult<Self> {
        let defaults = &app.composition;
        let fallback = (defaults.fallback_width, defaults.fallback_height);
        if fallback.0 == 0 || fallback.1 == 0 {
            return Err(PipcastError::config(format!(
                "fallback container must be non-empty, got {}x{}",
                fallback.0, fallback.1
            )));
        }
        Ok(Self {
            config: CompositionConfig::from_defaults(defaults)?,
            fallback_container: fallback,
            output_capacity: defaults.output_capacity.max(1),
        })
    }
}

/// Control handle for a running session.
#[derive(Debug)]
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionStats>,
}

impl SessionHandle {
    /// Request termination. Frames still held are released and the output
    /// ends; nothing is emitted afterwards.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the session to close and return its statistics.
    pub async fn join(self) -> PipcastResult<SessionStats> {
        self.task
            .await
            .map_err(|e| PipcastError::composite(format!("session task failed: {e}")))
    }
}

/// Result of [`compose_streams`]: one video sequence plus the untouched
/// audio track.
#[derive(Debug)]
pub struct ComposedStream {
    /// Output frames in pacing order. The channel closes when the session
    /// ends; dropping the receiver terminates the session.
    pub video: mpsc::Receiver<VideoFrame>,
    pub audio: Option<AudioTrack>,
    pub mode: CompositionMode,
    pub session: SessionHandle,
}

/// Start composing `primary` (the pacing overlay) over `secondary` (the
/// background).
///
/// With only one source present its frames are forwarded untouched and no
/// surface is acquired. Fails when neither source is present or when a
/// surface cannot be acquired; no frame is pulled in either case. Must be
/// called from within a Tokio runtime.
pub fn compose_streams(
    primary: Option<Box<dyn FrameSource>>,
    secondary: Option<Box<dyn FrameSource>>,
    audio: Option<AudioTrack>,
    options: &ComposeOptions,
    surfaces: &dyn SurfaceProvider,
) -> PipcastResult<ComposedStream> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| PipcastError::setup(format!("no async runtime available: {e}")))?;

    let (tx, rx) = mpsc::channel(options.output_capacity.max(1));
    let (state_tx, state_rx) = watch::channel(SessionState::Idle);
    let cancel = CancellationToken::new();
    let io = SessionIo {
        output: tx,
        cancel: cancel.clone(),
        state: state_tx,
    };

    let (mode, task) = match (primary, secondary) {
        (Some(pacing), Some(background)) => {
            let surface = surfaces.acquire().map_err(|e| {
                tracing::error!(error = %e, "Failed to acquire drawing surface");
                e
            })?;
            let session = CompositionSession::new(
                options.config,
                options.fallback_container,
                surface,
                pacing,
                background,
                io,
            );
            (CompositionMode::Dual, runtime.spawn(session.run()))
        }
        (Some(source), None) => {
            let session = PassthroughSession::new(CompositionMode::PrimaryOnly, source, io);
            (CompositionMode::PrimaryOnly, runtime.spawn(session.run()))
        }
        (None, Some(source)) => {
            let session = PassthroughSession::new(CompositionMode::SecondaryOnly, source, io);
            (CompositionMode::SecondaryOnly, runtime.spawn(session.run()))
        }
        (None, None) => {
            return Err(PipcastError::no_video_source(
                "neither a primary nor a secondary video source was provided",
            ));
        }
    };

    tracing::info!(
        %mode,
        audio = audio.as_ref().map(|a| a.label.as_str()),
        "Composition started"
    );

    Ok(ComposedStream {
        video: rx,
        audio,
        mode,
        session: SessionHandle {
            cancel,
            state: state_rx,
            task,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipcast_overlay_model::options::{OverlayPosition, SizeClass};

    #[test]
    fn options_from_app_config() {
        let mut app = AppConfig::default();
        app.composition.position = "top-left".to_string();
        app.composition.size = "XL".to_string();
        app.composition.output_capacity = 0;

        let options = ComposeOptions::from_app_config(&app).unwrap();
        assert_eq!(options.config.position, OverlayPosition::TopLeft);
        assert_eq!(options.config.size, SizeClass::ExtraLarge);
        assert_eq!(options.fallback_container, (1920, 1080));
        assert_eq!(options.output_capacity, 1);
    }

    #[test]
    fn empty_fallback_container_is_rejected() {
        let mut app = AppConfig::default();
        app.composition.fallback_width = 0;
        assert!(ComposeOptions::from_app_config(&app).is_err());
    }

    #[test]
    fn compose_outside_runtime_is_a_setup_error() {
        let err = compose_streams(
            None,
            None,
            None,
            &ComposeOptions::default(),
            &crate::surface::RasterSurfaceProvider::new(),
        )
        .unwrap_err();
        assert!(err.is_setup());
    }
}
