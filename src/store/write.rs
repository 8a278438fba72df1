//! Write path: upsert, delete, update-metadata, delete-by-workbook, clear,
//! compact. Every mutation runs inside a `rusqlite::Transaction` (which
//! rolls back on drop if not committed, giving the BEGIN/.../COMMIT-or-
//! ROLLBACK pattern `spec.md` §4.7 calls for without manual bookkeeping),
//! then marks the store dirty and, outside a batch, persists immediately.

use crate::codec;
use crate::error::{Result, StoreError};
use crate::record::{MetadataUpdate, VectorRecord};

use super::VectorStore;

impl VectorStore {
    /// Insert or fully replace records by id. No-op on empty input.
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.conn.lock().await;
            let dimension = self.dimension;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO vectors(
                        id, workbook_id, vector, sheet_name, kind, title,
                        r0, c0, r1, c1, content_hash, metadata_hash, token_count, text, metadata_json
                     ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                     ON CONFLICT(id) DO UPDATE SET
                        workbook_id = excluded.workbook_id,
                        vector = excluded.vector,
                        sheet_name = excluded.sheet_name,
                        kind = excluded.kind,
                        title = excluded.title,
                        r0 = excluded.r0,
                        c0 = excluded.c0,
                        r1 = excluded.r1,
                        c1 = excluded.c1,
                        content_hash = excluded.content_hash,
                        metadata_hash = excluded.metadata_hash,
                        token_count = excluded.token_count,
                        text = excluded.text,
                        metadata_json = excluded.metadata_json",
                )?;

                for record in records {
                    if record.id.is_empty() {
                        return Err(StoreError::invalid_argument("record id must be non-empty"));
                    }
                    codec::validate_dimension(&record.vector, dimension)?;
                    let normalized = codec::normalize_l2(&record.vector);
                    let blob = codec::encode(&normalized);
                    let cols = record.metadata.split(record.workbook_id.as_deref())?;

                    stmt.execute(rusqlite::params![
                        record.id,
                        cols.workbook_id,
                        blob,
                        cols.sheet_name,
                        cols.kind,
                        cols.title,
                        cols.r0,
                        cols.c0,
                        cols.r1,
                        cols.c1,
                        cols.content_hash,
                        cols.metadata_hash,
                        cols.token_count,
                        cols.text,
                        cols.metadata_json,
                    ])?;
                }
            }
            tx.commit()?;
        }

        self.after_write().await
    }

    /// Delete records by id. No-op on empty input.
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("DELETE FROM vectors WHERE id = ?1")?;
                for id in ids {
                    stmt.execute([id])?;
                }
            }
            tx.commit()?;
        }

        self.after_write().await
    }

    /// Update metadata columns by id without touching the stored vector.
    /// No-op on empty input.
    pub async fn update_metadata(&self, updates: &[MetadataUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "UPDATE vectors SET
                        workbook_id = ?1, sheet_name = ?2, kind = ?3, title = ?4,
                        r0 = ?5, c0 = ?6, r1 = ?7, c1 = ?8,
                        content_hash = ?9, metadata_hash = ?10, token_count = ?11, text = ?12,
                        metadata_json = ?13
                     WHERE id = ?14",
                )?;

                for update in updates {
                    let cols = update.metadata.split(update.workbook_id.as_deref())?;
                    stmt.execute(rusqlite::params![
                        cols.workbook_id,
                        cols.sheet_name,
                        cols.kind,
                        cols.title,
                        cols.r0,
                        cols.c0,
                        cols.r1,
                        cols.c1,
                        cols.content_hash,
                        cols.metadata_hash,
                        cols.token_count,
                        cols.text,
                        cols.metadata_json,
                        update.id,
                    ])?;
                }
            }
            tx.commit()?;
        }

        self.after_write().await
    }

    /// Delete every record scoped to `workbook_id`. Returns the number of
    /// rows removed; skips the delete entirely when the count is zero.
    pub async fn delete_workbook(&self, workbook_id: &str) -> Result<usize> {
        let count: i64 = {
            let conn = self.conn.lock().await;
            conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE workbook_id = ?1",
                [workbook_id],
                |row| row.get(0),
            )?
        };

        if count == 0 {
            return Ok(0);
        }

        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM vectors WHERE workbook_id = ?1", [workbook_id])?;
            tx.commit()?;
        }

        self.after_write().await?;
        Ok(count as usize)
    }

    /// Delete every row in the store.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM vectors", [])?;
            tx.commit()?;
        }
        self.after_write().await
    }

    /// Reclaim space with `VACUUM`. Waits for any in-flight persist to
    /// drain first (VACUUM cannot run while another connection action holds
    /// the image), then always persists afterward regardless of auto-save.
    pub async fn compact(&self) -> Result<()> {
        self.persistence.wait_idle().await;
        {
            let conn = self.conn.lock().await;
            conn.execute_batch("VACUUM")?;
        }
        self.persistence.mark_dirty();
        self.persist_now().await
    }

    /// Alias for [`VectorStore::compact`].
    pub async fn vacuum(&self) -> Result<()> {
        self.compact().await
    }
}
