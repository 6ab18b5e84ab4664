//! One open window per shard. The shard worker hands out non-decreasing arrival times,
//! so records it feeds are never late; the late-drop path guards other callers.

use super::{TumblingWindow, WindowedCount};
use crate::enrich::EnrichedRecord;
use crate::stats::{bump, PipelineStats};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Outcome of feeding one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Counted in the open window; `closed` holds the counts of a window this record closed.
    Counted { closed: Vec<WindowedCount> },
    /// Window already closed; record dropped.
    Late { window_start: DateTime<Utc> },
}

#[derive(Debug)]
struct OpenWindow {
    start: DateTime<Utc>,
    // None sorts first, so the unknown bucket leads every emission
    counts: BTreeMap<Option<Arc<str>>, u64>,
}

pub struct WindowedAggregator {
    shard: usize,
    window: TumblingWindow,
    open: Option<OpenWindow>,
    /// Earliest window start still accepted.
    horizon: Option<DateTime<Utc>>,
    stats: Arc<PipelineStats>,
}

impl WindowedAggregator {
    pub fn new(shard: usize, window: TumblingWindow, stats: Arc<PipelineStats>) -> Self {
        Self {
            shard,
            window,
            open: None,
            horizon: None,
            stats,
        }
    }

    pub fn open_window_start(&self) -> Option<DateTime<Utc>> {
        self.open.as_ref().map(|w| w.start)
    }

    pub fn observe(&mut self, record: &EnrichedRecord) -> Observation {
        let start = self.window.start_of(record.ingest_time);
        if matches!(self.horizon, Some(h) if start < h) {
            bump(&self.stats.late_records);
            debug!(
                shard = self.shard,
                window_start = %start,
                "late record dropped"
            );
            return Observation::Late {
                window_start: start,
            };
        }

        let mut closed = Vec::new();
        if matches!(&self.open, Some(w) if w.start < start) {
            closed = self.close();
        }
        let open = self.open.get_or_insert_with(|| OpenWindow {
            start,
            counts: BTreeMap::new(),
        });
        *open.counts.entry(record.label.clone()).or_insert(0) += 1;
        self.horizon = Some(start);
        Observation::Counted { closed }
    }

    /// Close the open window once `now` is past its end. Arrival times only grow,
    /// so nothing can still land in it.
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> Vec<WindowedCount> {
        let due = matches!(&self.open, Some(w) if now >= self.window.end_of(w.start));
        if due {
            self.close()
        } else {
            Vec::new()
        }
    }

    /// Emit whatever is open. Used on graceful drain.
    pub fn close_all(&mut self) -> Vec<WindowedCount> {
        self.close()
    }

    fn close(&mut self) -> Vec<WindowedCount> {
        let Some(w) = self.open.take() else {
            return Vec::new();
        };
        self.horizon = Some(self.window.end_of(w.start));
        let out: Vec<WindowedCount> = w
            .counts
            .into_iter()
            .map(|(label, count)| WindowedCount {
                label,
                window_start: w.start,
                count,
            })
            .collect();
        bump(&self.stats.windows_closed);
        self.stats
            .counts_emitted
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        debug!(
            shard = self.shard,
            window_start = %w.start,
            labels = out.len(),
            "window closed"
        );
        out
    }
}
