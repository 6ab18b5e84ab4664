//! Ingestion buffer: per-shard batching toward the durable store plus the
//! unbuffered real-time tap.
//!
//! ```text
//! submit(line) ──► open batch ──(age | size)──► sealed ──► flusher ──► BatchStore
//!        └───────► tap.forward(line)  (synchronous, arrival order)
//! ```

mod batch;
mod buffer;
mod flusher;

pub use batch::{object_key, SealedBatch};
pub use buffer::{BufferLimits, IngestionBuffer, Submit};
pub use flusher::{BatchFlusher, FlushReceipt};

use chrono::{DateTime, Utc};

/// Real-time consumer of accepted records. Called inline from `submit`.
pub trait Tap {
    fn forward(&mut self, line: &str, arrived_at: DateTime<Utc>);
}

impl<F> Tap for F
where
    F: FnMut(&str, DateTime<Utc>),
{
    fn forward(&mut self, line: &str, arrived_at: DateTime<Utc>) {
        self(line, arrived_at)
    }
}
