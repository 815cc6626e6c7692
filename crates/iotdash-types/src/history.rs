//! Rolling per-sensor sample history used for charting.

use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Number of samples kept per sensor.
pub const MAX_HISTORY_SAMPLES: usize = 20;

/// A single charted value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistorySample {
    /// When the value was observed.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// The observed value.
    pub value: f64,
}

/// Bounded, oldest-first sequence of samples for one sensor.
///
/// Holds at most [`MAX_HISTORY_SAMPLES`]; pushing onto a full history evicts
/// the oldest sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorHistory {
    samples: VecDeque<HistorySample>,
}

impl SensorHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_HISTORY_SAMPLES),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: HistorySample) {
        if self.samples.len() == MAX_HISTORY_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Append `value` observed now.
    pub fn record(&mut self, value: f64) {
        self.push(HistorySample {
            timestamp: OffsetDateTime::now_utc(),
            value,
        });
    }

    /// The most recent sample.
    #[must_use]
    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    /// Number of samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no samples are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Smallest and largest value held, if any.
    #[must_use]
    pub fn range(&self) -> Option<(f64, f64)> {
        self.samples.iter().fold(None, |acc, s| match acc {
            None => Some((s.value, s.value)),
            Some((lo, hi)) => Some((lo.min(s.value), hi.max(s.value))),
        })
    }
}
