//! Chunked byte storage: a directory of fixed-size chunk files plus a small
//! manifest, for hosts that cannot hold (or transfer) the whole snapshot as
//! one blob. Grounded on the chunked-export pattern used for large HNSW
//! snapshots in the wider example pack (`matte1782-edgevec`'s
//! `SNAPSHOT_CHUNK_SIZE` streaming writer).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Result, StoreError};
use crate::storage::ByteStorage;

const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
const MANIFEST_FILE: &str = "manifest";

#[derive(Debug)]
pub struct ChunkedStorage {
    dir: PathBuf,
    chunk_size: usize,
}

impl ChunkedStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            dir: dir.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    fn chunk_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("chunk-{index:08}"))
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    async fn clear_existing(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::storage_failure(e.to_string())),
        }
    }
}

#[async_trait]
impl ByteStorage for ChunkedStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let manifest_bytes = match fs::read(self.manifest_path()).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::storage_failure(e.to_string())),
        };
        let chunk_count: usize = std::str::from_utf8(&manifest_bytes)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| StoreError::invalid_metadata("corrupt chunked-storage manifest"))?;

        let mut out = Vec::new();
        for i in 0..chunk_count {
            let bytes = fs::read(self.chunk_path(i))
                .await
                .map_err(|e| StoreError::storage_failure(e.to_string()))?;
            out.extend_from_slice(&bytes);
        }
        Ok(Some(out))
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        self.clear_existing().await?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::storage_failure(e.to_string()))?;

        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            Vec::new()
        } else {
            bytes.chunks(self.chunk_size).collect()
        };
        for (i, chunk) in chunks.iter().enumerate() {
            fs::write(self.chunk_path(i), chunk)
                .await
                .map_err(|e| StoreError::storage_failure(e.to_string()))?;
        }
        fs::write(self.manifest_path(), chunks.len().to_string())
            .await
            .map_err(|e| StoreError::storage_failure(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.clear_existing().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_missing_manifest_returns_none() {
        let dir = tempdir().unwrap();
        let s = ChunkedStorage::new(dir.path().join("snap"));
        assert_eq!(s.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_across_multiple_chunks() {
        let dir = tempdir().unwrap();
        let s = ChunkedStorage::with_chunk_size(dir.path().join("snap"), 4);
        let data: Vec<u8> = (0..37u8).collect();
        s.save(&data).await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn save_empty_bytes_round_trips() {
        let dir = tempdir().unwrap();
        let s = ChunkedStorage::new(dir.path().join("snap"));
        s.save(&[]).await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn remove_clears_all_chunks() {
        let dir = tempdir().unwrap();
        let s = ChunkedStorage::with_chunk_size(dir.path().join("snap"), 4);
        s.save(&(0..20u8).collect::<Vec<_>>()).await.unwrap();
        s.remove().await.unwrap();
        assert_eq!(s.load().await.unwrap(), None);
    }
}
