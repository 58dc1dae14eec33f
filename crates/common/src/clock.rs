//! Frame cadence and timing utilities.
//!
//! Frame timestamps in PipCast are presentation timestamps in
//! microseconds, the unit capture devices hand us. This module provides:
//! - Converting a frame rate into per-frame timestamps
//! - Measuring drift between the pacing and background streams
//! - Gating live generators to a target rate

use std::time::Instant;

/// Microseconds per second.
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// Fixed frame cadence for a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameCadence {
    fps: f64,
}

impl FrameCadence {
    /// Create a cadence at the given frame rate. Non-positive rates clamp
    /// to 1 fps.
    pub fn new(fps: f64) -> Self {
        Self {
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 1.0 },
        }
    }

    /// Frames per second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Interval between consecutive frames, truncated to whole microseconds.
    pub fn interval_us(&self) -> i64 {
        (MICROS_PER_SEC as f64 / self.fps) as i64
    }

    /// Presentation timestamp of the frame at `index`, starting from `origin_us`.
    pub fn timestamp_us(&self, origin_us: i64, index: u64) -> i64 {
        origin_us + (index as f64 * MICROS_PER_SEC as f64 / self.fps) as i64
    }

    /// Interval as a `Duration`, for sleeping between live frames.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.interval_us().max(0) as u64)
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference (pacing) stream (µs).
    pub reference_us: i64,
    /// Timestamp in the measured (background) stream (µs).
    pub measured_us: i64,
}

impl DriftMeasurement {
    /// Drift in microseconds (positive = measured is ahead).
    pub fn drift_us(&self) -> i64 {
        self.measured_us - self.reference_us
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_us() as f64 / 1_000.0
    }

    /// How far the measured stream lags behind the reference, or zero.
    pub fn lag_us(&self) -> i64 {
        (-self.drift_us()).max(0)
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Rate controller for live frame generation.
#[derive(Debug)]
pub struct RateController {
    target_interval_us: i64,
    last_tick_us: Option<i64>,
}

impl RateController {
    /// Create a controller for the given cadence.
    pub fn new(cadence: FrameCadence) -> Self {
        Self {
            target_interval_us: cadence.interval_us(),
            last_tick_us: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_us: i64) -> bool {
        match self.last_tick_us {
            None => {
                self.last_tick_us = Some(current_us);
                true
            }
            Some(last) if current_us >= last + self.target_interval_us => {
                self.last_tick_us = Some(current_us);
                true
            }
            _ => false,
        }
    }

    /// Microseconds until the next tick is due, measured from `current_us`.
    pub fn until_next_us(&self, current_us: i64) -> i64 {
        match self.last_tick_us {
            None => 0,
            Some(last) => (last + self.target_interval_us - current_us).max(0),
        }
    }

    /// Target interval in microseconds.
    pub fn interval_us(&self) -> i64 {
        self.target_interval_us
    }
}

/// Monotonic microsecond clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Microseconds elapsed since the clock started.
    pub fn elapsed_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }
}
