//! In-memory byte storage — no durability across process restarts, but
//! useful for ephemeral sessions and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::ByteStorage;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ByteStorage for MemoryStorage {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.read().await.clone())
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.write().await = Some(bytes.to_vec());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.bytes.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_before_save_returns_none() {
        let s = MemoryStorage::new();
        assert_eq!(s.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let s = MemoryStorage::new();
        s.save(b"hello").await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn remove_clears_snapshot() {
        let s = MemoryStorage::new();
        s.save(b"hello").await.unwrap();
        s.remove().await.unwrap();
        assert_eq!(s.load().await.unwrap(), None);
    }
}
