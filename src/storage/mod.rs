//! Durable batch store: compressed batch objects addressed by deterministic keys.
//!
//! `put` must overwrite an existing object with the same key; a retried flush
//! relies on that to stay idempotent.

mod fs;
mod memory;

pub use fs::FsBatchStore;
pub use memory::MemoryBatchStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Write (or overwrite) one object.
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError>;

    /// Startup reachability check.
    async fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
