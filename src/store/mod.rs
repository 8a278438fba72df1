//! Store lifecycle: `create`/open-or-initialize, dimension validation,
//! reset-on-corrupt and reset-on-dimension-mismatch, and `close`.
//!
//! The relational image lives behind a single `tokio::sync::Mutex`, which is
//! the read/write lock `SPEC_FULL.md` §9 calls for: every public operation
//! locks it for the duration of its own work, so reads and writes alike see
//! a consistent snapshot and never interleave with another in-flight call.

mod read;
mod write;

pub use read::{ListOptions, QueryOptions};

use rusqlite::{Connection, DatabaseName};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::persistence::PersistenceQueue;
use crate::schema;
use crate::similarity;
use crate::storage::ByteStorage;

/// Options accepted by [`VectorStore::create`].
///
/// `serde`-deserializable so embedding hosts can load it from their own
/// config file, the way `graves-awful_aj::config::AwfulJadeConfig` is loaded,
/// without this crate owning a config file format of its own.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoreOptions {
    pub dimension: usize,
    #[serde(default = "default_true")]
    pub auto_save: bool,
    #[serde(default = "default_true")]
    pub reset_on_corrupt: bool,
    #[serde(default = "default_true")]
    pub reset_on_dimension_mismatch: bool,
}

fn default_true() -> bool {
    true
}

impl StoreOptions {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            auto_save: true,
            reset_on_corrupt: true,
            reset_on_dimension_mismatch: true,
        }
    }
}

/// A persistent, embedded vector index over a pluggable byte-array backend.
pub struct VectorStore {
    conn: AsyncMutex<Connection>,
    dimension: usize,
    storage: Box<dyn ByteStorage>,
    persistence: PersistenceQueue,
    auto_save: bool,
}

/// Lightweight introspection for hosts that want to log/observe store state
/// without a dedicated metrics subsystem (out of scope per `spec.md` §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub row_count: usize,
    pub dirty: bool,
    pub dimension: usize,
}

impl VectorStore {
    /// Open or initialize a store over `storage`.
    ///
    /// See `spec.md` §4.9 for the full state machine; this follows it
    /// step by step.
    pub async fn create(opts: StoreOptions, storage: Box<dyn ByteStorage>) -> Result<Self> {
        if opts.dimension == 0 {
            return Err(StoreError::invalid_argument(
                "dimension must be a positive integer",
            ));
        }

        let loaded = match storage.load().await {
            Ok(bytes) => bytes,
            Err(e) if opts.reset_on_corrupt => {
                warn!(error = %e, "snapshot load failed, resetting (reset_on_corrupt)");
                None
            }
            Err(e) => return Err(e),
        };

        let persistence = PersistenceQueue::new();

        let conn = match loaded {
            None => {
                let conn = Connection::open_in_memory()?;
                schema::init_fresh(&conn, opts.dimension)?;
                similarity::register_dot(&conn, opts.dimension)?;
                conn
            }
            Some(bytes) => {
                let mut conn = match import_snapshot(&bytes) {
                    Ok(conn) => conn,
                    Err(e) if opts.reset_on_corrupt => {
                        warn!(error = %e, "snapshot deserialize failed, resetting (reset_on_corrupt)");
                        let conn = Connection::open_in_memory()?;
                        schema::init_fresh(&conn, opts.dimension)?;
                        similarity::register_dot(&conn, opts.dimension)?;
                        return Ok(Self {
                            conn: AsyncMutex::new(conn),
                            dimension: opts.dimension,
                            storage,
                            persistence,
                            auto_save: opts.auto_save,
                        });
                    }
                    Err(e) => return Err(e),
                };

                schema::init_tables_if_missing(&conn)?;

                match schema::get_meta(&conn, "dimension")? {
                    None => schema::set_meta(&conn, "dimension", &opts.dimension.to_string())?,
                    Some(raw) => {
                        let db_dimension: i64 = raw
                            .parse()
                            .map_err(|_| StoreError::invalid_metadata("non-numeric dimension meta"))?;
                        if db_dimension <= 0 {
                            return Err(StoreError::invalid_metadata(
                                "stored dimension is not a positive integer",
                            ));
                        }
                        let db_dimension = db_dimension as usize;
                        if db_dimension != opts.dimension {
                            if opts.reset_on_dimension_mismatch {
                                warn!(
                                    db_dimension,
                                    requested_dimension = opts.dimension,
                                    "dimension mismatch at open, resetting (reset_on_dimension_mismatch)"
                                );
                                let fresh = Connection::open_in_memory()?;
                                schema::init_fresh(&fresh, opts.dimension)?;
                                similarity::register_dot(&fresh, opts.dimension)?;
                                let store = Self {
                                    conn: AsyncMutex::new(fresh),
                                    dimension: opts.dimension,
                                    storage,
                                    persistence,
                                    auto_save: opts.auto_save,
                                };
                                store.persistence.mark_dirty();
                                let _ = store.persist_now().await;
                                return Ok(store);
                            }
                            return Err(StoreError::DimensionMismatch {
                                db_dimension: Some(db_dimension),
                                requested_dimension: Some(opts.dimension),
                                id: None,
                            });
                        }
                    }
                }

                let migrated = schema::migrate_if_needed(&mut conn)?;
                similarity::register_dot(&conn, opts.dimension)?;

                if migrated {
                    info!("store was migrated on open");
                    persistence.mark_dirty();
                }

                conn
            }
        };

        let store = Self {
            conn: AsyncMutex::new(conn),
            dimension: opts.dimension,
            storage,
            persistence,
            auto_save: opts.auto_save,
        };

        if store.persistence.is_dirty() && store.auto_save {
            store.persist_now().await?;
        }

        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().await;
        let row_count: i64 = conn.query_row("SELECT COUNT(*) FROM vectors", [], |r| r.get(0))?;
        Ok(StoreStats {
            row_count: row_count as usize,
            dirty: self.persistence.is_dirty(),
            dimension: self.dimension,
        })
    }

    /// Suppress auto-persist for the duration of `f`; persist at most once,
    /// at the outermost successful exit, if any write marked the store
    /// dirty. Propagates `f`'s error without persisting.
    pub async fn batch<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.persistence.enter_batch();
        let result = f().await;
        let is_outermost = self.persistence.exit_batch();

        match result {
            Ok(value) => {
                if is_outermost && self.persistence.is_dirty() {
                    self.persist_now().await?;
                }
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    /// Enqueue a final persist and await it, then drop the connection.
    pub async fn close(self) -> Result<()> {
        self.persist_now().await
    }

    async fn after_write(&self) -> Result<()> {
        self.persistence.mark_dirty();
        if self.auto_save && !self.persistence.in_batch() {
            self.persist_now().await?;
        }
        Ok(())
    }

    /// Export the current image, re-register the scalar function (the
    /// export can cost the connection its user-registered functions), then
    /// hand the bytes to `storage`. A no-op when not dirty.
    ///
    /// The re-registration runs even when the export itself fails: SQLite
    /// may drop the function as a side effect of attempting the export, not
    /// only on a successful one, so re-registering is defensive rather than
    /// conditioned on `export_snapshot`'s outcome.
    async fn persist_now(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        let dimension = self.dimension;
        let export = || -> Result<Vec<u8>> {
            let result = export_snapshot(&conn);
            if let Err(e) = similarity::register_dot(&conn, dimension) {
                warn!(error = %e, "failed to re-register dot() after snapshot export");
            }
            result
        };
        self.persistence.persist_once(&*self.storage, export).await
    }
}

/// Serialize the live image to bytes via SQLite's `sqlite3_serialize`
/// (`rusqlite`'s `serialize` feature). Opaque to callers; portability across
/// SQLite versions is delegated to SQLite's own format guarantees.
fn export_snapshot(conn: &Connection) -> Result<Vec<u8>> {
    let data = conn
        .serialize(DatabaseName::Main)
        .map_err(|e| StoreError::engine(e.to_string()))?;
    Ok(data.to_vec())
}

/// Rehydrate an in-memory connection from bytes previously produced by
/// [`export_snapshot`], via `sqlite3_deserialize`.
fn import_snapshot(bytes: &[u8]) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    conn.deserialize(DatabaseName::Main, bytes.to_vec())
        .map_err(|e| StoreError::engine(e.to_string()))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VectorRecord;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn create_fresh_store_is_not_dirty() {
        let store = VectorStore::create(StoreOptions::new(3), Box::new(MemoryStorage::new()))
            .await
            .unwrap();
        assert_eq!(store.dimension(), 3);
        let stats = store.stats().await.unwrap();
        assert!(!stats.dirty);
        assert_eq!(stats.row_count, 0);
    }

    #[tokio::test]
    async fn close_on_fresh_untouched_store_does_not_write_snapshot() {
        let storage = MemoryStorage::new();
        let store = VectorStore::create(StoreOptions::new(3), Box::new(storage))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_after_close_preserves_rows() {
        let storage = std::sync::Arc::new(MemoryStorage::new());

        struct ArcStorage(std::sync::Arc<MemoryStorage>);
        #[async_trait::async_trait]
        impl ByteStorage for ArcStorage {
            async fn load(&self) -> Result<Option<Vec<u8>>> {
                self.0.load().await
            }
            async fn save(&self, bytes: &[u8]) -> Result<()> {
                self.0.save(bytes).await
            }
        }

        let store = VectorStore::create(
            StoreOptions::new(3),
            Box::new(ArcStorage(storage.clone())),
        )
        .await
        .unwrap();
        store
            .upsert(&[VectorRecord {
                id: "a".into(),
                vector: vec![3.0, 0.0, 4.0],
                workbook_id: Some("wb1".into()),
                metadata: Default::default(),
            }])
            .await
            .unwrap();
        store.close().await.unwrap();

        let reopened = VectorStore::create(StoreOptions::new(3), Box::new(ArcStorage(storage)))
            .await
            .unwrap();
        let record = reopened.get("a").await.unwrap().unwrap();
        let vector = record.vector.unwrap();
        assert!((vector[0] - 0.6).abs() < 1e-6);
        assert!((vector[2] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimension_mismatch_on_open_is_fatal_without_reset() {
        let storage = std::sync::Arc::new(MemoryStorage::new());

        struct ArcStorage(std::sync::Arc<MemoryStorage>);
        #[async_trait::async_trait]
        impl ByteStorage for ArcStorage {
            async fn load(&self) -> Result<Option<Vec<u8>>> {
                self.0.load().await
            }
            async fn save(&self, bytes: &[u8]) -> Result<()> {
                self.0.save(bytes).await
            }
        }

        let store = VectorStore::create(StoreOptions::new(8), Box::new(ArcStorage(storage.clone())))
            .await
            .unwrap();
        store.close().await.unwrap();

        let mut opts = StoreOptions::new(4);
        opts.reset_on_dimension_mismatch = false;
        let err = VectorStore::create(opts, Box::new(ArcStorage(storage.clone())))
            .await
            .unwrap_err();
        match err {
            StoreError::DimensionMismatch {
                db_dimension,
                requested_dimension,
                ..
            } => {
                assert_eq!(db_dimension, Some(8));
                assert_eq!(requested_dimension, Some(4));
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }

        let mut opts = StoreOptions::new(4);
        opts.reset_on_dimension_mismatch = true;
        let reset = VectorStore::create(opts, Box::new(ArcStorage(storage)))
            .await
            .unwrap();
        assert_eq!(reset.dimension(), 4);
        assert_eq!(reset.stats().await.unwrap().row_count, 0);
    }

    #[tokio::test]
    async fn batch_persists_exactly_once_across_many_writes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingStorage {
            inner: MemoryStorage,
            saves: Arc<AtomicUsize>,
        }
        #[async_trait::async_trait]
        impl ByteStorage for CountingStorage {
            async fn load(&self) -> Result<Option<Vec<u8>>> {
                self.inner.load().await
            }
            async fn save(&self, bytes: &[u8]) -> Result<()> {
                self.saves.fetch_add(1, Ordering::SeqCst);
                self.inner.save(bytes).await
            }
        }

        let saves = Arc::new(AtomicUsize::new(0));
        let store = VectorStore::create(
            StoreOptions::new(3),
            Box::new(CountingStorage {
                inner: MemoryStorage::new(),
                saves: saves.clone(),
            }),
        )
        .await
        .unwrap();

        store
            .batch(|| async {
                for i in 0..1000 {
                    store
                        .upsert(&[VectorRecord {
                            id: format!("id-{i}"),
                            vector: vec![1.0, 0.0, 0.0],
                            workbook_id: None,
                            metadata: Default::default(),
                        }])
                        .await?;
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }
}
