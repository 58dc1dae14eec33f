//! PipCast Overlay Model
//!
//! Defines the data contracts for placing one video over another:
//! - **Options:** Overlay corner, size class, corner rounding, aspect ratio
//! - **Geometry:** Resolved overlay rectangles under the recording and
//!   preview sizing policies
//! - **Layout:** Which captured sources a recording uses
//! - **Preview:** Live on-screen overlay placement that follows the
//!   background size
//!
//! This crate is pure computation. All inputs are data; all outputs are data.

pub mod geometry;
pub mod layout;
pub mod options;
pub mod preview;

pub use geometry::*;
pub use layout::*;
pub use options::*;
pub use preview::*;
