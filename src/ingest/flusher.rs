//! Per-shard flusher. Sealed batches are written strictly one after another,
//! so a shard never has two flushes in flight.

use super::batch::SealedBatch;
use crate::retry::Backoff;
use crate::stats::{bump, PipelineStats};
use crate::storage::BatchStore;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What a completed flush wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReceipt {
    pub key: String,
    pub records: u64,
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
    pub attempts: u32,
    pub sha256: String,
}

pub struct BatchFlusher {
    shard: usize,
    store: Arc<dyn BatchStore>,
    backoff: Backoff,
    compression_level: u32,
    unflushed: Arc<AtomicU64>,
    stats: Arc<PipelineStats>,
}

impl BatchFlusher {
    pub fn new(
        shard: usize,
        store: Arc<dyn BatchStore>,
        backoff: Backoff,
        compression_level: u32,
        unflushed: Arc<AtomicU64>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            shard,
            store,
            backoff,
            compression_level,
            unflushed,
            stats,
        }
    }

    /// Drain sealed batches until the buffer side hangs up.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<SealedBatch>) {
        while let Some(batch) = rx.recv().await {
            if let Err(e) = self.flush(batch).await {
                warn!(shard = self.shard, error = %e, "batch could not be encoded");
            }
        }
    }

    /// Compress once, then write under the batch's fixed key until the store accepts it.
    /// Failed writes are retried with the same key and bytes, so a partial write is overwritten.
    pub async fn flush(&self, batch: SealedBatch) -> std::io::Result<FlushReceipt> {
        let raw_bytes = batch.raw_len() as u64;
        let level = self.compression_level;
        let SealedBatch {
            key, records, body, ..
        } = batch;
        let compressed = match tokio::task::spawn_blocking(move || {
            super::batch::gzip(&body, level)
        })
        .await
        {
            Ok(r) => r,
            Err(join) => Err(std::io::Error::new(std::io::ErrorKind::Other, join)),
        };
        let compressed = match compressed {
            Ok(c) => c,
            Err(e) => {
                self.unflushed.fetch_sub(raw_bytes, Ordering::AcqRel);
                bump(&self.stats.batches_dropped);
                return Err(e);
            }
        };
        let sha256 = format!("{:x}", Sha256::digest(&compressed));

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.store.put(&key, &compressed).await {
                Ok(()) => break,
                Err(e) => {
                    bump(&self.stats.flush_retries);
                    let delay = self.backoff.jittered(attempts);
                    warn!(
                        shard = self.shard,
                        key = %key,
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "batch flush failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.unflushed.fetch_sub(raw_bytes, Ordering::AcqRel);
        bump(&self.stats.batches_flushed);
        let receipt = FlushReceipt {
            key,
            records,
            raw_bytes,
            compressed_bytes: compressed.len() as u64,
            attempts,
            sha256,
        };
        info!(
            shard = self.shard,
            key = %receipt.key,
            records = receipt.records,
            raw_bytes = receipt.raw_bytes,
            compressed_bytes = receipt.compressed_bytes,
            attempts = receipt.attempts,
            sha256 = %receipt.sha256,
            "batch flushed"
        );
        Ok(receipt)
    }
}
