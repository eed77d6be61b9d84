//! Signal sources.
//!
//! A session pulls its signals one at a time, in order, from a
//! `SignalSource`. Sources are finite; `None` means the feed is exhausted.

pub mod csv_source;

use std::collections::VecDeque;

use crate::types::Signal;

pub use csv_source::CsvSignalSource;

pub trait SignalSource: Send {
    /// Next signal in feed order, or `None` once exhausted.
    fn next_signal(&mut self) -> Option<Signal>;
}

/// In-memory source, mostly for tests and scripted runs.
#[derive(Debug, Clone, Default)]
pub struct VecSignalSource {
    signals: VecDeque<Signal>,
}

impl VecSignalSource {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals: signals.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.signals.len()
    }
}

impl SignalSource for VecSignalSource {
    fn next_signal(&mut self) -> Option<Signal> {
        self.signals.pop_front()
    }
}

impl From<Vec<Signal>> for VecSignalSource {
    fn from(signals: Vec<Signal>) -> Self {
        Self::new(signals)
    }
}
