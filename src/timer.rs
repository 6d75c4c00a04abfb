//! Monotonic interval measurement (component C1 — Timer).
//!
//! A [`Timer`] is a simple stopwatch: `start()` records the current instant,
//! `stop()` records the end instant and the identity of the stopping
//! thread. Durations are derived from [`Instant`] subtraction, which can
//! never go backwards on its own, but we still guard the subtraction with
//! `checked_duration_since` and clamp-and-warn rather than trust that
//! invariant blindly — see spec.md §9's note that the original clamp read
//! from an unrelated, always-zero property; this is the redesigned version
//! it recommends.

use std::thread::ThreadId;
use std::time::{Duration, Instant};

use crate::error::{BuildError, Result};

/// A single start/stop interval, with the thread that called `stop()`.
#[derive(Debug)]
pub struct Timer {
    label: String,
    start: Option<Instant>,
    end: Option<Instant>,
    stopped_by: Option<ThreadId>,
}

impl Timer {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), start: None, end: None, stopped_by: None }
    }

    /// Records the current instant as the start of the interval.
    ///
    /// # Errors
    /// Returns [`BuildError::Message`] if the timer was already started.
    pub fn start(&mut self) -> Result<()> {
        if self.start.is_some() {
            return Err(BuildError::msg(format!("timer '{}' already started", self.label)));
        }
        self.start = Some(Instant::now());
        Ok(())
    }

    /// Records the current instant and stopping thread as the end of the interval.
    ///
    /// # Errors
    /// Returns [`BuildError::Message`] if the timer was never started or already stopped.
    pub fn stop(&mut self) -> Result<()> {
        if self.start.is_none() {
            return Err(BuildError::msg(format!("timer '{}' stopped before it started", self.label)));
        }
        if self.end.is_some() {
            return Err(BuildError::msg(format!("timer '{}' already stopped", self.label)));
        }
        self.end = Some(Instant::now());
        self.stopped_by = Some(std::thread::current().id());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.end.is_some()
    }

    pub fn start_instant(&self) -> Option<Instant> {
        self.start
    }

    pub fn stopped_by(&self) -> Option<ThreadId> {
        self.stopped_by
    }

    /// Wall-clock duration of the interval. Zero if the timer hasn't
    /// completed a start/stop pair. A non-monotonic observation (which
    /// should be unreachable given `Instant`'s guarantees) is clamped to
    /// zero with a warning rather than silently producing a bogus interval.
    pub fn duration(&self) -> Duration {
        match (self.start, self.end) {
            (Some(start), Some(end)) => end.checked_duration_since(start).unwrap_or_else(|| {
                warn!(timer = %self.label, "observed non-monotonic timer interval; clamping to zero");
                Duration::ZERO
            }),
            _ => Duration::ZERO,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration().as_secs_f64() * 1_000.0
    }

    pub fn duration_us(&self) -> f64 {
        self.duration().as_secs_f64() * 1_000_000.0
    }
}
