//! Single-file byte storage.
//!
//! `save` writes to a sibling temp file and renames it over the target.
//! POSIX rename is atomic on the same filesystem, so a concurrent `load`
//! never observes a partially written snapshot. No explicit `fsync` is
//! issued before the rename — this is a best-effort durability guarantee,
//! matching the teacher's own `fs::write`-based persistence in
//! `vector_store.rs::serialize`, not a transactional one (see `SPEC_FULL.md`
//! §9's open-question resolution).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{Result, StoreError};
use crate::storage::ByteStorage;

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ByteStorage for FileStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::storage_failure(e.to_string())),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::storage_failure(e.to_string()))?;

        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| StoreError::storage_failure(e.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::storage_failure(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::storage_failure(e.to_string())),
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!("{file_name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_missing_file_returns_none() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path().join("store.bin"));
        assert_eq!(s.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path().join("nested").join("store.bin"));
        s.save(b"snapshot bytes").await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(b"snapshot bytes".to_vec()));
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let s = FileStorage::new(&path);
        s.save(b"first").await.unwrap();
        s.save(b"second").await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(b"second".to_vec()));
        assert!(!tmp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let s = FileStorage::new(dir.path().join("store.bin"));
        s.save(b"x").await.unwrap();
        s.remove().await.unwrap();
        assert_eq!(s.load().await.unwrap(), None);
    }
}
