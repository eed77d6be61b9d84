//! Execution timing tracker.
//!
//! Keeps a bounded window of measured execution durations per duration
//! class and turns it into a latency estimate the scheduler subtracts from
//! each target time. One tracker is built per process and shared by all
//! sessions through an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::types::TraderError;

/// Largest startup latency a class may assume, in seconds.
const MAX_INITIAL_LATENCY_SECS: f64 = 60.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A named range of requested trade durations with its own estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationClass {
    pub name: String,
    /// Inclusive upper bound of requested durations in this class.
    pub max_duration_secs: u32,
    /// Extra time allowed for the result beyond the trade's own duration.
    pub result_buffer_secs: u64,
    /// Latency assumed before any sample has been recorded.
    pub initial_latency_secs: f64,
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Samples kept per class.
    pub window: usize,
    pub classes: Vec<DurationClass>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            window: 10,
            classes: vec![
                DurationClass {
                    name: "short".into(),
                    max_duration_secs: 60,
                    result_buffer_secs: 15,
                    initial_latency_secs: 1.0,
                },
                DurationClass {
                    name: "long".into(),
                    max_duration_secs: u32::MAX,
                    result_buffer_secs: 30,
                    initial_latency_secs: 1.5,
                },
            ],
        }
    }
}

impl TimingConfig {
    pub fn validate(&self) -> Result<(), TraderError> {
        if self.window == 0 {
            return Err(TraderError::Config("timing.window must be at least 1".into()));
        }
        for class in &self.classes {
            let secs = class.initial_latency_secs;
            if !secs.is_finite() || !(0.0..=MAX_INITIAL_LATENCY_SECS).contains(&secs) {
                return Err(TraderError::Config(format!(
                    "initial_latency_secs for class {} must be within 0..={MAX_INITIAL_LATENCY_SECS}, got {secs}",
                    class.name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One measured execution, from submission to result receipt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub measured_duration_seconds: f64,
    pub requested_duration_seconds: u32,
}

impl TimingSample {
    /// Time spent beyond the trade's own duration.
    pub fn overhead_secs(&self) -> f64 {
        self.measured_duration_seconds - self.requested_duration_seconds as f64
    }
}

#[derive(Debug)]
struct SlidingWindow {
    capacity: usize,
    samples: VecDeque<TimingSample>,
}

impl SlidingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, sample: TimingSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn mean_overhead(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(TimingSample::overhead_secs).sum();
        Some(total / self.samples.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct TimingTracker {
    classes: Vec<DurationClass>,
    windows: Vec<Mutex<SlidingWindow>>,
}

impl TimingTracker {
    /// Build a tracker. Classes are ordered by upper bound; a catch-all class
    /// is appended when the configured ones do not reach `u32::MAX`.
    pub fn new(config: TimingConfig) -> Self {
        let mut classes = config.classes;
        classes.sort_by_key(|c| c.max_duration_secs);
        if classes.last().map_or(true, |c| c.max_duration_secs < u32::MAX) {
            classes.push(DurationClass {
                name: "overflow".into(),
                max_duration_secs: u32::MAX,
                result_buffer_secs: 30,
                initial_latency_secs: 1.0,
            });
        }

        let capacity = config.window.max(1);
        let windows = classes
            .iter()
            .map(|_| Mutex::new(SlidingWindow::new(capacity)))
            .collect();

        Self { classes, windows }
    }

    fn class_index(&self, duration_secs: u32) -> usize {
        self.classes
            .iter()
            .position(|c| duration_secs <= c.max_duration_secs)
            .unwrap_or(self.classes.len() - 1)
    }

    /// Duration class a requested duration falls into.
    pub fn class_for(&self, duration_secs: u32) -> &DurationClass {
        &self.classes[self.class_index(duration_secs)]
    }

    /// Record a measured execution.
    pub fn record(&self, sample: TimingSample) {
        let idx = self.class_index(sample.requested_duration_seconds);
        let mut window = self.windows[idx].lock().unwrap_or_else(PoisonError::into_inner);
        window.push(sample);
        debug!(
            class = %self.classes[idx].name,
            measured = format!("{:.3}s", sample.measured_duration_seconds),
            overhead = format!("{:.3}s", sample.overhead_secs()),
            samples = window.samples.len(),
            "Timing sample recorded"
        );
    }

    /// Estimated latency in seconds for trades of the given duration.
    /// Never negative.
    pub fn average_latency(&self, duration_secs: u32) -> f64 {
        let idx = self.class_index(duration_secs);
        let window = self.windows[idx].lock().unwrap_or_else(PoisonError::into_inner);
        window
            .mean_overhead()
            .unwrap_or(self.classes[idx].initial_latency_secs)
            .max(0.0)
    }

    /// Number of samples currently held for the class of `duration_secs`.
    pub fn sample_count(&self, duration_secs: u32) -> usize {
        let idx = self.class_index(duration_secs);
        self.windows[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .samples
            .len()
    }
}

impl Default for TimingTracker {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
