//! PipCast Compositor
//!
//! Live two-source compositor: every frame from the pacing source (the
//! camera) is drawn, clipped to a rounded rectangle, over the most recent
//! frame of the background source (the screen), producing one output frame
//! with the pacing frame's timestamp.
//!
//! # Pipeline
//!
//! ```text
//! camera (pacing) ──pull──┐
//!                         ├── Resize surface to background
//! screen (background) ────┘   (one fetch in flight, latest held)
//!                                      │
//!                                      ├── Overlay geometry
//!                                      │   (position, size, aspect)
//!                                      ▼
//!                              Rounded-clip overlay draw
//!                                      │
//!                                      ▼
//!                         Snapshot @ pacing timestamp
//!                                      │
//!                                      ▼
//!                               mpsc ──▶ sink
//! ```
//!
//! With a single source present, frames are forwarded untouched.

pub mod compose;
pub mod frame;
pub mod session;
pub mod slot;
pub mod source;
pub mod surface;

pub use compose::*;
pub use frame::{FrameId, FrameLedger, LedgerReport, LedgerViolation, VideoFrame};
pub use session::{CompositionMode, SessionState, SessionStats, Termination};
pub use source::{ChannelSource, FrameSource, ScriptEnd, ScriptedSource, SyntheticSource};
pub use surface::{DrawingSurface, RasterSurfaceProvider, SurfaceProvider};
