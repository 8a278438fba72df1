//! Byte storage: opaque `load`/`save`/`remove` of a single snapshot blob.
//!
//! Each implementation guarantees that a `save` is atomic from the engine's
//! perspective (partial writes are never observed by a subsequent `load`).
//! `load` failures are the caller's trigger for reset-on-corrupt (see
//! `store::lifecycle`).

mod chunked;
mod file;
mod memory;

pub use chunked::ChunkedStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;

use crate::error::Result;

/// Pluggable durable backend for the store's serialized snapshot.
#[async_trait]
pub trait ByteStorage: Send + Sync {
    /// Return the last persisted snapshot, or `None` if there isn't one.
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Durably replace the stored snapshot with `bytes`.
    async fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Delete the snapshot. Implementations that cannot support a true
    /// delete fall back to `save(&[])`, per the storage contract.
    async fn remove(&self) -> Result<()> {
        self.save(&[]).await
    }
}
