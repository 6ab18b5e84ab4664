//! Filesystem-backed store. Objects land under `root/<key>`; writes go through a
//! temp file and a rename so readers never see half an object.

use super::{BatchStore, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct FsBatchStore {
    root: PathBuf,
}

impl FsBatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BatchStore for FsBatchStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let tmp = path.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io)?;
        file.write_all(body).await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;
        Ok(())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let unavailable =
            |e: std::io::Error| StoreError::Unavailable(format!("{}: {}", self.root.display(), e));
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(unavailable)?;
        let probe = self.root.join(".probe");
        tokio::fs::write(&probe, b"ok").await.map_err(unavailable)?;
        tokio::fs::remove_file(&probe).await.map_err(unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBatchStore::new(dir.path());
        store.probe().await.unwrap();
        let key = "raw-data/2019/08/31/00/shard-0000-0000000001.gz";
        store.put(key, b"first").await.unwrap();
        store.put(key, b"second").await.unwrap();
        assert_eq!(std::fs::read(store.path_of(key)).unwrap(), b"second");
        assert!(!store.path_of(key).with_extension("part").exists());
    }

    #[tokio::test]
    async fn probe_fails_on_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let store = FsBatchStore::new(file.join("nested"));
        assert!(matches!(
            store.probe().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
