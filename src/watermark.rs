//! Tracking of the already-dispatched boundary.

use crate::core::LogLine;
use chrono::{DateTime, Duration, Utc};

/// The timestamp boundary below which lines count as already dispatched.
///
/// The boundary only moves forward. A cycle filters against one snapshot
/// taken before it starts, then advances once to the newest processed
/// timestamp plus `epsilon`, so equal timestamps within a batch are all
/// delivered and none of them is delivered again next cycle.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    boundary: DateTime<Utc>,
    epsilon: Duration,
}

impl WatermarkTracker {
    /// Starts at `start`, normally "now" so history is not replayed.
    pub fn new(start: DateTime<Utc>, epsilon: Duration) -> Self {
        Self {
            boundary: start,
            epsilon,
        }
    }

    /// Converts a fractional-second epsilon, clamping to at least 1ms.
    pub fn epsilon_from_secs(secs: f64) -> Duration {
        let millis = (secs * 1000.0).round() as i64;
        Duration::milliseconds(millis.max(1))
    }

    pub fn boundary(&self) -> DateTime<Utc> {
        self.boundary
    }

    /// The boundary value a cycle filters against.
    pub fn snapshot(&self) -> Watermark {
        Watermark(self.boundary)
    }

    /// Advances past the newest of `processed`. Never moves backwards.
    pub fn advance<'a, I>(&mut self, processed: I)
    where
        I: IntoIterator<Item = &'a LogLine>,
    {
        if let Some(newest) = processed.into_iter().map(|l| l.timestamp).max() {
            let candidate = newest + self.epsilon;
            if candidate > self.boundary {
                self.boundary = candidate;
            }
        }
    }
}

/// An immutable boundary captured at cycle start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn should_dispatch(&self, line: &LogLine) -> bool {
        line.timestamp >= self.0
    }
}
