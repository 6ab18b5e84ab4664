//! Tumbling-window counts per label.
//!
//! Each shard owns one [`WindowedAggregator`]. Windows are `[start, start + W)`
//! aligned to the epoch. A record in a later window closes the open one
//! (every label seen in it is emitted, then the state is dropped). Records for
//! a window before the open one are late: there is no watermark, so they are
//! dropped and counted.

mod aggregator;

pub use aggregator::{Observation, WindowedAggregator};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Fixed window width with epoch alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TumblingWindow {
    width_ms: i64,
}

impl TumblingWindow {
    pub fn new(width: std::time::Duration) -> Self {
        Self {
            width_ms: (width.as_millis() as i64).max(1),
        }
    }

    pub fn width(&self) -> Duration {
        Duration::milliseconds(self.width_ms)
    }

    /// `floor(ts / W) * W`
    pub fn start_of(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let ms = ts.timestamp_millis();
        let start = ms - ms.rem_euclid(self.width_ms);
        Utc.timestamp_millis_opt(start).single().unwrap_or(ts)
    }

    pub fn end_of(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.width()
    }
}

/// De-duplication identity of an emitted count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub label: Option<Arc<str>>,
    pub window_start: DateTime<Utc>,
}

/// Closed-window aggregate. `label: null` is the unknown-reference bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowedCount {
    pub label: Option<Arc<str>>,
    pub window_start: DateTime<Utc>,
    pub count: u64,
}

impl WindowedCount {
    pub fn key(&self) -> WindowKey {
        WindowKey {
            label: self.label.clone(),
            window_start: self.window_start,
        }
    }

    /// Stable string form of the key, `<window_start_ms>|<label>`; labels are never empty.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            self.window_start.timestamp_millis(),
            self.label.as_deref().unwrap_or("")
        )
    }
}
