//! Latency probe series and sustained-threshold evaluation.
//!
//! A predicate only holds if the condition is continuous across the most
//! recent window of the requested duration. Degenerate series (fewer than
//! two samples, or less observed history than the window asks for) fail
//! closed: the evaluator refuses to assert "sustained" without evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single probe latency observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub latency: Duration,
}

/// Directional latency probe between two node identities.
///
/// Multiple links may converge on the same `to` node, and a node may appear
/// as `from` in some links and `to` in others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from: String,
    pub to: String,
}

impl Link {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Time-ordered latency samples for one link, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries(Vec<Sample>);

impl TimeSeries {
    /// Build a series, sorting samples into timestamp order.
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self(samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True iff every sample in the trailing `for_at_least` window is
    /// strictly above `threshold`.
    pub fn sustained_above(&self, threshold: Duration, for_at_least: Duration) -> bool {
        self.sustained(for_at_least, |latency| latency > threshold)
    }

    /// True iff every sample in the trailing `for_at_least` window is
    /// strictly below `threshold`.
    ///
    /// Not the complement of [`sustained_above`](Self::sustained_above):
    /// the two are evaluated with different windows and a series can fail
    /// both (the "unstable" gap). A sample exactly at the threshold fails
    /// both predicates.
    pub fn sustained_below(&self, threshold: Duration, for_at_least: Duration) -> bool {
        self.sustained(for_at_least, |latency| latency < threshold)
    }

    fn sustained(&self, for_at_least: Duration, holds: impl Fn(Duration) -> bool) -> bool {
        let (Some(first), Some(last)) = (self.0.first(), self.0.last()) else {
            return false;
        };
        if self.0.len() < 2 {
            return false;
        }
        let Ok(window) = chrono::Duration::from_std(for_at_least) else {
            return false;
        };
        if last.timestamp - first.timestamp < window {
            return false;
        }

        // Window start is inclusive: a sample landing exactly on the
        // boundary participates in the verdict.
        let start = last.timestamp - window;
        self.0
            .iter()
            .filter(|s| s.timestamp >= start)
            .all(|s| holds(s.latency))
    }
}

impl From<Vec<Sample>> for TimeSeries {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}
