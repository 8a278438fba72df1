//! Persistence queue: dirty tracking, FIFO-serialized snapshot export, and
//! batched-write suppression.
//!
//! - `dirty` flips true on any mutation (schema writes included), flips
//!   false optimistically at the start of a persist attempt, and flips back
//!   true on failure.
//! - `persist_once` calls are serialized through a single async mutex so no
//!   two `save`s overlap; a failed persist does not break the chain — the
//!   next caller simply finds `dirty` still set and tries again.
//! - While `batch_depth > 0`, auto-persist is suppressed; at the outermost
//!   successful batch exit, one persist is enqueued if dirty.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::error::Result;
use crate::storage::ByteStorage;

#[derive(Debug, Default)]
pub struct PersistenceQueue {
    dirty: AtomicBool,
    batch_depth: AtomicUsize,
    persist_lock: AsyncMutex<()>,
}

impl PersistenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn in_batch(&self) -> bool {
        self.batch_depth.load(Ordering::SeqCst) > 0
    }

    /// Suppress auto-persist for the scope about to be entered.
    pub fn enter_batch(&self) {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Leave a batch scope; returns `true` when this was the outermost exit
    /// (depth reached zero), the point at which a pending persist should run.
    pub fn exit_batch(&self) -> bool {
        self.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Block until any in-flight persist completes, without starting a new
    /// one. Used by `compact`, which must wait for the queue to drain before
    /// running `VACUUM`.
    pub async fn wait_idle(&self) {
        let _guard = self.persist_lock.lock().await;
    }

    /// If dirty, export + save exactly once; otherwise a no-op. Serialized
    /// against other concurrent calls via an internal async mutex so no two
    /// saves overlap and ordering matches call order.
    pub async fn persist_once<S>(
        &self,
        storage: &S,
        export: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<()>
    where
        S: ByteStorage + ?Sized,
    {
        let _guard = self.persist_lock.lock().await;
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.dirty.store(false, Ordering::SeqCst);

        let bytes = match export() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "snapshot export failed, leaving store dirty");
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        match storage.save(&bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "snapshot save failed, leaving store dirty");
                self.dirty.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Force a persist unconditionally, regardless of auto-save or dirty
    /// state (used by `compact`, which always persists).
    pub async fn persist_unconditionally<S>(
        &self,
        storage: &S,
        export: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<()>
    where
        S: ByteStorage + ?Sized,
    {
        self.mark_dirty();
        self.persist_once(storage, export).await
    }

    /// Suppress auto-persist for the duration of `body`; at the outermost
    /// successful exit, enqueue one persist if dirty. If `body` fails,
    /// propagate without persisting.
    pub async fn batch<T, F, Fut, S>(
        &self,
        storage: &S,
        export: impl FnOnce() -> Result<Vec<u8>>,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        S: ByteStorage + ?Sized,
    {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
        let result = body().await;
        let depth_after = self.batch_depth.fetch_sub(1, Ordering::SeqCst) - 1;

        match result {
            Ok(value) => {
                if depth_after == 0 && self.is_dirty() {
                    self.persist_once(storage, export).await?;
                }
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}
