//! Versioned table layout and idempotent schema migration.
//!
//! Two logical tables:
//!
//! - `vector_store_meta(key PRIMARY, value)` — `dimension`, `schema_version`.
//! - `vectors(id PRIMARY, workbook_id, vector BLOB, <structured columns>,
//!   metadata_json)` — one row per record.
//!
//! Plus an index on `workbook_id` and a covering index over
//! `(workbook_id, id, content_hash, metadata_hash, length(vector))` used by
//! the hash-catalog scan without touching vector/text payloads.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

const STRUCTURED_COLUMNS: &[(&str, &str)] = &[
    ("sheet_name", "TEXT"),
    ("kind", "TEXT"),
    ("title", "TEXT"),
    ("r0", "INTEGER"),
    ("c0", "INTEGER"),
    ("r1", "INTEGER"),
    ("c1", "INTEGER"),
    ("content_hash", "TEXT"),
    ("metadata_hash", "TEXT"),
    ("token_count", "INTEGER"),
    ("text", "TEXT"),
];

const COVERING_INDEX_NAME: &str = "idx_vectors_hash_catalog";
const COVERING_INDEX_SQL: &str =
    "CREATE INDEX idx_vectors_hash_catalog ON vectors(workbook_id, id, content_hash, metadata_hash, length(vector))";

/// Create the schema from scratch for a brand-new store. Already current;
/// the version is stamped immediately and no migration is needed afterward.
pub fn init_fresh(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vector_store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS vectors (
             id TEXT PRIMARY KEY,
             workbook_id TEXT,
             vector BLOB NOT NULL,
             sheet_name TEXT,
             kind TEXT,
             title TEXT,
             r0 INTEGER,
             c0 INTEGER,
             r1 INTEGER,
             c1 INTEGER,
             content_hash TEXT,
             metadata_hash TEXT,
             token_count INTEGER,
             text TEXT,
             metadata_json TEXT NOT NULL DEFAULT '{}'
         );
         CREATE INDEX IF NOT EXISTS idx_vectors_workbook ON vectors(workbook_id);",
    )?;
    ensure_covering_index(conn)?;
    set_meta(conn, "dimension", &dimension.to_string())?;
    set_meta(conn, "schema_version", &CURRENT_SCHEMA_VERSION.to_string())?;
    Ok(())
}

/// Ensure every table/index referenced by the current schema exists, without
/// assuming the connection is fresh (used right after opening a loaded
/// snapshot, before reading its meta).
pub fn init_tables_if_missing(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vector_store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
         CREATE TABLE IF NOT EXISTS vectors (
             id TEXT PRIMARY KEY,
             workbook_id TEXT,
             vector BLOB NOT NULL,
             metadata_json TEXT NOT NULL DEFAULT '{}'
         );
         CREATE INDEX IF NOT EXISTS idx_vectors_workbook ON vectors(workbook_id);",
    )?;
    Ok(())
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM vector_store_meta WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .ok();
    Ok(value)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO vector_store_meta(key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn missing_structured_columns(conn: &Connection) -> Result<Vec<(&'static str, &'static str)>> {
    let existing = column_names(conn, "vectors")?;
    Ok(STRUCTURED_COLUMNS
        .iter()
        .copied()
        .filter(|(name, _)| !existing.iter().any(|e| e == name))
        .collect())
}

fn covering_index_matches(conn: &Connection) -> Result<bool> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='index' AND name=?1",
            [COVERING_INDEX_NAME],
            |row| row.get(0),
        )
        .ok();
    Ok(sql.as_deref() == Some(COVERING_INDEX_SQL))
}

fn ensure_covering_index(conn: &Connection) -> Result<()> {
    if !covering_index_matches(conn)? {
        conn.execute_batch(&format!(
            "DROP INDEX IF EXISTS {COVERING_INDEX_NAME}; {COVERING_INDEX_SQL};"
        ))?;
    }
    Ok(())
}

/// Run the v1→v2 migration (and the "repair pass" for stores that claim
/// v2 but are missing a structured column) if needed. Idempotent: calling
/// this again on an already-migrated store changes nothing.
///
/// Performed inside a single logical transaction; on failure the in-memory
/// image is rolled back and the error is propagated unchanged.
pub fn migrate_if_needed(conn: &mut Connection) -> Result<bool> {
    init_tables_if_missing(conn)?;
    let version: i64 = get_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let missing = missing_structured_columns(conn)?;

    if version >= CURRENT_SCHEMA_VERSION && missing.is_empty() && covering_index_matches(conn)? {
        debug!(version, "schema already current, no migration needed");
        return Ok(false);
    }

    info!(from_version = version, to_version = CURRENT_SCHEMA_VERSION, missing = missing.len(), "running schema migration");

    let tx = conn.transaction()?;
    for (name, decl) in &missing {
        tx.execute_batch(&format!("ALTER TABLE vectors ADD COLUMN {name} {decl}"))?;
    }

    // Repair pass: redistribute keys from legacy metadata_json into the
    // (now-present) structured columns, preferring existing column values.
    {
        let mut stmt = tx.prepare("SELECT id, metadata_json, sheet_name, kind, title, r0, c0, r1, c1, content_hash, metadata_hash, token_count, text FROM vectors")?;
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<String>,
            Option<String>,
            Option<i64>,
            Option<String>,
        )> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
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
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        for (
            id,
            metadata_json,
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
        ) in rows
        {
            let legacy: serde_json::Map<String, serde_json::Value> =
                match serde_json::from_str::<serde_json::Value>(&metadata_json) {
                    Ok(serde_json::Value::Object(m)) => m,
                    _ => serde_json::Map::new(),
                };

            let legacy_str = |key: &str| legacy.get(key).and_then(|v| v.as_str()).map(str::to_string);
            let legacy_i64 = |key: &str| legacy.get(key).and_then(|v| v.as_i64());

            let new_sheet_name = sheet_name.or_else(|| legacy_str("sheetName"));
            let new_kind = kind.or_else(|| legacy_str("kind"));
            let new_title = title.or_else(|| legacy_str("title"));
            let new_content_hash = content_hash.or_else(|| legacy_str("contentHash"));
            let new_metadata_hash = metadata_hash.or_else(|| legacy_str("metadataHash"));
            let new_token_count = token_count.or_else(|| legacy_i64("tokenCount"));
            let new_text = text.or_else(|| legacy_str("text"));
            let (new_r0, new_c0, new_r1, new_c1) = match (r0, c0, r1, c1) {
                (Some(a), Some(b), Some(c), Some(d)) => (Some(a), Some(b), Some(c), Some(d)),
                _ => match legacy.get("rect") {
                    Some(serde_json::Value::Object(rect)) => (
                        rect.get("r0").and_then(|v| v.as_i64()),
                        rect.get("c0").and_then(|v| v.as_i64()),
                        rect.get("r1").and_then(|v| v.as_i64()),
                        rect.get("c1").and_then(|v| v.as_i64()),
                    ),
                    _ => (r0, c0, r1, c1),
                },
            };

            let mut extras = legacy;
            for key in [
                "workbookId",
                "sheetName",
                "kind",
                "title",
                "rect",
                "contentHash",
                "metadataHash",
                "tokenCount",
                "text",
            ] {
                extras.remove(key);
            }
            let new_metadata_json = if extras.is_empty() {
                "{}".to_string()
            } else {
                serde_json::to_string(&extras).unwrap_or_else(|_| "{}".to_string())
            };

            tx.execute(
                "UPDATE vectors SET sheet_name=?1, kind=?2, title=?3, r0=?4, c0=?5, r1=?6, c1=?7, content_hash=?8, metadata_hash=?9, token_count=?10, text=?11, metadata_json=?12 WHERE id=?13",
                rusqlite::params![
                    new_sheet_name,
                    new_kind,
                    new_title,
                    new_r0,
                    new_c0,
                    new_r1,
                    new_c1,
                    new_content_hash,
                    new_metadata_hash,
                    new_token_count,
                    new_text,
                    new_metadata_json,
                    id,
                ],
            )?;
        }
    }

    ensure_covering_index(&tx)?;
    set_meta(&tx, "schema_version", &CURRENT_SCHEMA_VERSION.to_string())?;
    tx.commit()?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_v1_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE vector_store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             CREATE TABLE vectors (id TEXT PRIMARY KEY, workbook_id TEXT, vector BLOB NOT NULL, metadata_json TEXT NOT NULL DEFAULT '{}');
             INSERT INTO vector_store_meta(key, value) VALUES ('dimension', '3');
             INSERT INTO vector_store_meta(key, value) VALUES ('schema_version', '1');",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO vectors(id, workbook_id, vector, metadata_json) VALUES ('a', 'wb1', X'000000000000803F0000000000000000', ?1)",
            [r#"{"kind":"table","title":"T","sheetName":"Sheet1","extraKey":"keepme"}"#],
        )
        .unwrap();
        conn
    }

    #[test]
    fn fresh_init_stamps_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_fresh(&conn, 3).unwrap();
        assert_eq!(
            get_meta(&conn, "schema_version").unwrap(),
            Some(CURRENT_SCHEMA_VERSION.to_string())
        );
        assert!(missing_structured_columns(&conn).unwrap().is_empty());
    }

    #[test]
    fn migrate_v1_to_v2_populates_structured_columns_and_preserves_extras() {
        let mut conn = legacy_v1_connection();
        let migrated = migrate_if_needed(&mut conn).unwrap();
        assert!(migrated);
        assert_eq!(
            get_meta(&conn, "schema_version").unwrap(),
            Some("2".to_string())
        );

        let (kind, title, sheet_name, metadata_json): (Option<String>, Option<String>, Option<String>, String) = conn
            .query_row(
                "SELECT kind, title, sheet_name, metadata_json FROM vectors WHERE id='a'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(kind.as_deref(), Some("table"));
        assert_eq!(title.as_deref(), Some("T"));
        assert_eq!(sheet_name.as_deref(), Some("Sheet1"));
        let extras: serde_json::Value = serde_json::from_str(&metadata_json).unwrap();
        assert_eq!(extras["extraKey"], "keepme");
        assert!(extras.get("kind").is_none());
    }

    #[test]
    fn migration_is_idempotent() {
        let mut conn = legacy_v1_connection();
        migrate_if_needed(&mut conn).unwrap();
        let migrated_again = migrate_if_needed(&mut conn).unwrap();
        assert!(!migrated_again);
    }

    #[test]
    fn repair_pass_runs_even_at_current_version_if_column_missing() {
        let conn = Connection::open_in_memory().unwrap();
        init_fresh(&conn, 3).unwrap();
        conn.execute_batch("ALTER TABLE vectors RENAME COLUMN kind TO kind_old").unwrap();
        let mut conn = conn;
        let migrated = migrate_if_needed(&mut conn).unwrap();
        assert!(migrated);
        assert!(missing_structured_columns(&conn).unwrap().is_empty());
    }

    #[test]
    fn covering_index_is_recreated_when_definition_is_stale() {
        let conn = Connection::open_in_memory().unwrap();
        init_fresh(&conn, 3).unwrap();
        conn.execute_batch(&format!(
            "DROP INDEX {COVERING_INDEX_NAME}; CREATE INDEX {COVERING_INDEX_NAME} ON vectors(workbook_id);"
        ))
        .unwrap();
        assert!(!covering_index_matches(&conn).unwrap());
        let mut conn = conn;
        migrate_if_needed(&mut conn).unwrap();
        assert!(covering_index_matches(&conn).unwrap());
    }
}
