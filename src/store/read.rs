//! Read & query path: `get`, `list`, `list_content_hashes`, and the
//! oversampling k-nearest-neighbor `query`. Mirrors `spec.md` §4.8,
//! including the opaque-engine-error diagnosis path in `query` (§4.8 step 7)
//! that probes for corrupt blob lengths once the `dot()` scalar function
//! surfaces an error SQLite has otherwise stripped of useful context.

use rusqlite::Connection;

use crate::cancellation::{self, CancellationToken};
use crate::codec;
use crate::error::{Result, StoreError};
use crate::metadata::RecordMetadata;
use crate::record::{HashCatalogEntry, SearchResult, StoredRecord};

use super::VectorStore;

/// Options for [`VectorStore::list`].
#[derive(Default)]
pub struct ListOptions<'a> {
    pub workbook_id: Option<&'a str>,
    pub include_vector: bool,
    pub filter: Option<&'a dyn Fn(&RecordMetadata) -> bool>,
    pub signal: Option<&'a CancellationToken>,
}

/// Options for [`VectorStore::query`].
#[derive(Default)]
pub struct QueryOptions<'a> {
    pub workbook_id: Option<&'a str>,
    pub filter: Option<&'a dyn Fn(&RecordMetadata) -> bool>,
    pub signal: Option<&'a CancellationToken>,
}

#[allow(clippy::too_many_arguments)]
fn row_to_metadata(
    workbook_id: Option<String>,
    sheet_name: Option<String>,
    kind: Option<String>,
    title: Option<String>,
    r0: Option<i64>,
    c0: Option<i64>,
    r1: Option<i64>,
    c1: Option<i64>,
    content_hash: Option<String>,
    metadata_hash: Option<String>,
    token_count: Option<i64>,
    text: Option<String>,
    metadata_json: &str,
) -> Result<RecordMetadata> {
    RecordMetadata::merge(
        workbook_id,
        sheet_name,
        kind,
        title,
        r0,
        c0,
        r1,
        c1,
        content_hash,
        metadata_hash,
        token_count,
        text,
        metadata_json,
    )
}

const FULL_ROW_COLUMNS: &str = "workbook_id, sheet_name, kind, title, r0, c0, r1, c1, \
     content_hash, metadata_hash, token_count, text, metadata_json";

impl VectorStore {
    /// Fetch a single record by id, decoding and validating its vector
    /// against the store's dimension.
    pub async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock().await;
        let dimension = self.dimension;

        let row = conn.query_row(
            &format!("SELECT vector, {FULL_ROW_COLUMNS} FROM vectors WHERE id = ?1"),
            [id],
            |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, Option<i64>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, String>(13)?,
                ))
            },
        );

        match row {
            Ok((
                vector_bytes,
                workbook_id,
                sheet_name,
                kind,
                title,
                r0,
                c0,
                r1,
                c1,
                content_hash,
                metadata_hash,
                token_count,
                text,
                metadata_json,
            )) => {
                let vector = codec::decode_validated(&vector_bytes, dimension, id)?;
                let metadata = row_to_metadata(
                    workbook_id,
                    sheet_name,
                    kind,
                    title,
                    r0,
                    c0,
                    r1,
                    c1,
                    content_hash,
                    metadata_hash,
                    token_count,
                    text,
                    &metadata_json,
                )?;
                Ok(Some(StoredRecord {
                    id: id.to_string(),
                    vector: Some(vector),
                    metadata,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Scan rows, optionally scoped to a workbook and filtered in memory.
    /// When `include_vector` is false, only `length(vector)` is fetched and
    /// validated, without decoding the blob.
    pub async fn list(&self, opts: ListOptions<'_>) -> Result<Vec<StoredRecord>> {
        cancellation::check_opt(opts.signal)?;

        let conn = self.conn.lock().await;
        let dimension = self.dimension;

        let vector_select = if opts.include_vector {
            "vector"
        } else {
            "length(vector)"
        };
        let where_clause = if opts.workbook_id.is_some() {
            " WHERE workbook_id = ?1"
        } else {
            ""
        };
        let sql =
            format!("SELECT id, {vector_select}, {FULL_ROW_COLUMNS} FROM vectors{where_clause}");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = if let Some(wb) = opts.workbook_id {
            stmt.query([wb])?
        } else {
            stmt.query([])?
        };

        let mut results = Vec::new();
        loop {
            cancellation::check_opt(opts.signal)?;
            let Some(row) = rows.next()? else { break };

            let id: String = row.get(0)?;
            let vector = if opts.include_vector {
                let bytes: Vec<u8> = row.get(1)?;
                Some(codec::decode_validated(&bytes, dimension, &id)?)
            } else {
                let len: i64 = row.get(1)?;
                let len = len as usize;
                if len % 4 != 0 || len != dimension * 4 {
                    return Err(StoreError::InvalidBlobLength {
                        id: Some(id.clone()),
                        length: len,
                        dimension: Some(dimension),
                    });
                }
                None
            };

            let metadata = row_to_metadata(
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
                &row.get::<_, String>(14)?,
            )?;

            if let Some(filter) = opts.filter {
                if !filter(&metadata) {
                    continue;
                }
            }

            results.push(StoredRecord { id, vector, metadata });
        }

        Ok(results)
    }

    /// Scan only the covering hash-catalog index: `(id, contentHash,
    /// metadataHash)`, validating each row's vector byte length along the
    /// way without touching the vector/text payloads.
    pub async fn list_content_hashes(
        &self,
        workbook_id: Option<&str>,
    ) -> Result<Vec<HashCatalogEntry>> {
        let conn = self.conn.lock().await;
        let dimension = self.dimension;

        let sql = if workbook_id.is_some() {
            "SELECT id, content_hash, metadata_hash, length(vector) FROM vectors WHERE workbook_id = ?1"
        } else {
            "SELECT id, content_hash, metadata_hash, length(vector) FROM vectors"
        };

        let mut stmt = conn.prepare(sql)?;
        let mut rows = if let Some(wb) = workbook_id {
            stmt.query([wb])?
        } else {
            stmt.query([])?
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let content_hash: Option<String> = row.get(1)?;
            let metadata_hash: Option<String> = row.get(2)?;
            let len: i64 = row.get(3)?;
            let len = len as usize;
            if len % 4 != 0 || len != dimension * 4 {
                return Err(StoreError::InvalidBlobLength {
                    id: Some(id),
                    length: len,
                    dimension: Some(dimension),
                });
            }
            out.push(HashCatalogEntry {
                id,
                content_hash,
                metadata_hash,
            });
        }

        Ok(out)
    }

    /// Exact k-nearest-neighbor search by cosine similarity (the stored
    /// vectors are L2-normalized at write time, so the registered `dot()`
    /// scalar function already computes cosine similarity).
    pub async fn query(
        &self,
        vector: &[f32],
        k: f64,
        opts: QueryOptions<'_>,
    ) -> Result<Vec<SearchResult>> {
        cancellation::check_opt(opts.signal)?;

        if !k.is_finite() {
            return Err(StoreError::invalid_argument("k must be finite"));
        }
        let k = k.floor();
        if k <= 0.0 {
            return Ok(Vec::new());
        }
        let k = k as usize;

        codec::validate_dimension(vector, self.dimension)?;
        let normalized = codec::normalize_l2(vector);
        let query_blob = codec::encode(&normalized);

        let has_filter = opts.filter.is_some();
        let oversample_factor: usize = if has_filter { 4 } else { 1 };
        let min_limit: usize = if has_filter { 64 } else { k };
        let mut limit = (k * oversample_factor).max(min_limit);

        let conn = self.conn.lock().await;

        loop {
            cancellation::check_opt(opts.signal)?;

            let matches = match self.run_query_once(&conn, &query_blob, limit, &opts) {
                Ok(m) => m,
                Err(RowScanError::Cancelled) => return Err(StoreError::Cancelled),
                Err(RowScanError::Engine(e)) => {
                    return Err(self.diagnose_query_error(&conn, opts.workbook_id, e))
                }
            };

            let scanned = matches.scanned;
            let mut rows = matches.rows;
            if rows.len() >= k || scanned < limit {
                rows.truncate(k);
                return Ok(rows);
            }
            limit *= 2;
        }
    }

    fn run_query_once(
        &self,
        conn: &Connection,
        query_blob: &[u8],
        limit: usize,
        opts: &QueryOptions<'_>,
    ) -> std::result::Result<ScannedRows, RowScanError> {
        let sql = if opts.workbook_id.is_some() {
            format!(
                "SELECT id, {FULL_ROW_COLUMNS}, dot(vector, ?1) AS score FROM vectors \
                 WHERE workbook_id = ?2 ORDER BY score DESC, id ASC LIMIT ?3"
            )
        } else {
            format!(
                "SELECT id, {FULL_ROW_COLUMNS}, dot(vector, ?1) AS score FROM vectors \
                 ORDER BY score DESC, id ASC LIMIT ?2"
            )
        };

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = if let Some(wb) = opts.workbook_id {
            stmt.query(rusqlite::params![query_blob, wb, limit as i64])?
        } else {
            stmt.query(rusqlite::params![query_blob, limit as i64])?
        };

        let mut out = Vec::new();
        let mut scanned = 0usize;
        loop {
            if cancellation::check_opt(opts.signal).is_err() {
                return Err(RowScanError::Cancelled);
            }
            let Some(row) = rows.next()? else { break };
            scanned += 1;

            let id: String = row.get(0)?;
            let metadata = row_to_metadata(
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                &row.get::<_, String>(13)?,
            )
            .map_err(|e| {
                rusqlite::Error::UserFunctionError(format!("metadata decode failed: {e}").into())
            })?;
            let score: f64 = row.get(14)?;

            if let Some(filter) = opts.filter {
                if !filter(&metadata) {
                    continue;
                }
            }

            out.push(SearchResult {
                id,
                score: score as f32,
                metadata,
            });
        }

        Ok(ScannedRows { rows: out, scanned })
    }

    /// Probe for rows whose `length(vector)` doesn't match the declared
    /// dimension once the relational engine surfaces an opaque error from
    /// inside the `dot()` scalar function, naming the first offending id.
    /// Falls back to wrapping the original error when nothing is found.
    fn diagnose_query_error(
        &self,
        conn: &Connection,
        workbook_id: Option<&str>,
        original: rusqlite::Error,
    ) -> StoreError {
        let dimension = self.dimension;
        let expected_len = (dimension * 4) as i64;

        let probe = if let Some(wb) = workbook_id {
            conn.query_row(
                "SELECT id, length(vector) FROM vectors \
                 WHERE workbook_id = ?1 AND (length(vector) % 4 != 0 OR length(vector) != ?2) \
                 LIMIT 1",
                rusqlite::params![wb, expected_len],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
        } else {
            conn.query_row(
                "SELECT id, length(vector) FROM vectors \
                 WHERE length(vector) % 4 != 0 OR length(vector) != ?1 \
                 LIMIT 1",
                [expected_len],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
        };

        match probe {
            Ok((id, len)) => StoreError::InvalidBlobLength {
                id: Some(id),
                length: len as usize,
                dimension: Some(dimension),
            },
            Err(_) => StoreError::engine(original.to_string()),
        }
    }
}

struct ScannedRows {
    rows: Vec<SearchResult>,
    scanned: usize,
}

/// Distinguishes a cooperative cancellation from a genuine engine error
/// inside [`VectorStore::run_query_once`]'s row-scan loop, so the caller can
/// propagate [`StoreError::Cancelled`] directly instead of routing it
/// through the opaque-engine-error diagnosis path.
enum RowScanError {
    Cancelled,
    Engine(rusqlite::Error),
}

impl From<rusqlite::Error> for RowScanError {
    fn from(e: rusqlite::Error) -> Self {
        RowScanError::Engine(e)
    }
}
