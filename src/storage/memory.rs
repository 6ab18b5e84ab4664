//! In-memory store for tests and benches; keeps every write so retries can be inspected.

use super::{BatchStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current objects by key.
    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Keys of every successful write, in order, including overwrites.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        objects.insert(key.to_string(), body.to_vec());
        drop(objects);
        if let Ok(mut w) = self.writes.lock() {
            w.push(key.to_string());
        }
        Ok(())
    }
}
