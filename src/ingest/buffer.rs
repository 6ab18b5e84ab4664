//! Open batch, thresholds and backpressure for one shard.

use super::batch::{object_key, SealedBatch};
use super::Tap;
use crate::config::{IngestConfig, StorageConfig};
use crate::stats::{bump, PipelineStats};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// Unflushed data is at the hard cap; the record was not taken.
    Throttled,
}

#[derive(Debug, Clone)]
pub struct BufferLimits {
    pub flush_interval: Duration,
    pub flush_size_bytes: u64,
    pub max_buffered_bytes: u64,
    pub prefix: String,
}

impl BufferLimits {
    pub fn from_config(ingest: &IngestConfig, storage: &StorageConfig) -> Self {
        Self {
            flush_interval: ingest.flush_interval(),
            flush_size_bytes: ingest.flush_size_bytes,
            max_buffered_bytes: ingest.max_buffered_bytes,
            prefix: storage.prefix.clone(),
        }
    }
}

pub struct IngestionBuffer<T: Tap> {
    shard: usize,
    limits: BufferLimits,
    open: Vec<u8>,
    open_records: u64,
    opened_at: Option<DateTime<Utc>>,
    next_seq: u64,
    /// Sealed bytes not yet confirmed durable; the flusher subtracts on success.
    unflushed: Arc<AtomicU64>,
    sealed_tx: mpsc::UnboundedSender<SealedBatch>,
    tap: T,
    stats: Arc<PipelineStats>,
}

impl<T: Tap> IngestionBuffer<T> {
    pub fn new(
        shard: usize,
        limits: BufferLimits,
        unflushed: Arc<AtomicU64>,
        sealed_tx: mpsc::UnboundedSender<SealedBatch>,
        tap: T,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            shard,
            limits,
            open: Vec::new(),
            open_records: 0,
            opened_at: None,
            next_seq: 1,
            unflushed,
            sealed_tx,
            tap,
            stats,
        }
    }

    /// Accept one record at `now`. Never waits on storage.
    pub fn submit(&mut self, line: &str, now: DateTime<Utc>) -> Submit {
        let line = line.trim_end_matches(['\n', '\r']);
        let incoming = line.len() as u64 + 1;
        let buffered = self.buffered_bytes();
        if buffered > 0 && buffered + incoming > self.limits.max_buffered_bytes {
            bump(&self.stats.throttled);
            return Submit::Throttled;
        }

        if self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
        self.open.extend_from_slice(line.as_bytes());
        self.open.push(b'\n');
        self.open_records += 1;
        bump(&self.stats.accepted);

        self.tap.forward(line, now);

        if self.open.len() as u64 >= self.limits.flush_size_bytes {
            self.seal("size");
        }
        Submit::Accepted
    }

    /// Seal the open batch if its first record is at least the flush interval old.
    pub fn poll_age(&mut self, now: DateTime<Utc>) -> bool {
        let Some(opened) = self.opened_at else {
            return false;
        };
        let age = now.signed_duration_since(opened).to_std().unwrap_or_default();
        if age >= self.limits.flush_interval {
            self.seal("age");
            true
        } else {
            false
        }
    }

    /// Seal whatever is open (graceful drain).
    pub fn seal_remaining(&mut self) -> bool {
        if self.open.is_empty() {
            return false;
        }
        self.seal("drain");
        true
    }

    /// Open batch plus everything sealed but not yet durable.
    pub fn buffered_bytes(&self) -> u64 {
        self.open.len() as u64 + self.unflushed.load(Ordering::Acquire)
    }

    pub fn open_records(&self) -> u64 {
        self.open_records
    }

    pub fn tap_mut(&mut self) -> &mut T {
        &mut self.tap
    }

    pub fn into_tap(self) -> T {
        self.tap
    }

    fn seal(&mut self, trigger: &'static str) {
        let Some(opened_at) = self.opened_at.take() else {
            return;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        let body = std::mem::take(&mut self.open);
        let records = std::mem::replace(&mut self.open_records, 0);
        let batch = SealedBatch {
            shard: self.shard,
            seq,
            key: object_key(&self.limits.prefix, self.shard, seq, opened_at),
            opened_at,
            records,
            body,
        };
        let bytes = batch.raw_len() as u64;
        debug!(shard = self.shard, seq, records, bytes, trigger, "batch sealed");
        self.unflushed.fetch_add(bytes, Ordering::AcqRel);
        if let Err(mpsc::error::SendError(batch)) = self.sealed_tx.send(batch) {
            self.unflushed.fetch_sub(bytes, Ordering::AcqRel);
            bump(&self.stats.batches_dropped);
            error!(
                shard = self.shard,
                key = %batch.key,
                records = batch.records,
                "flusher gone; sealed batch dropped"
            );
        }
    }
}
