//! Pipeline-wide counters. Shards and tasks bump them lock-free; a snapshot is logged at shutdown.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub accepted: AtomicU64,
    pub throttled: AtomicU64,
    pub malformed_records: AtomicU64,
    pub reference_misses: AtomicU64,
    pub late_records: AtomicU64,
    pub windows_closed: AtomicU64,
    pub counts_emitted: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub flush_retries: AtomicU64,
    pub batches_dropped: AtomicU64,
    pub sink_delivered: AtomicU64,
    pub sink_retries: AtomicU64,
    pub sink_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub throttled: u64,
    pub malformed_records: u64,
    pub reference_misses: u64,
    pub late_records: u64,
    pub windows_closed: u64,
    pub counts_emitted: u64,
    pub batches_flushed: u64,
    pub flush_retries: u64,
    pub batches_dropped: u64,
    pub sink_delivered: u64,
    pub sink_retries: u64,
    pub sink_dropped: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            accepted: get(&self.accepted),
            throttled: get(&self.throttled),
            malformed_records: get(&self.malformed_records),
            reference_misses: get(&self.reference_misses),
            late_records: get(&self.late_records),
            windows_closed: get(&self.windows_closed),
            counts_emitted: get(&self.counts_emitted),
            batches_flushed: get(&self.batches_flushed),
            flush_retries: get(&self.flush_retries),
            batches_dropped: get(&self.batches_dropped),
            sink_delivered: get(&self.sink_delivered),
            sink_retries: get(&self.sink_retries),
            sink_dropped: get(&self.sink_dropped),
        }
    }
}
