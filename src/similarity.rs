//! Registers the `dot(vector_blob, vector_blob) -> REAL` scalar function used
//! by `ORDER BY score DESC` queries.
//!
//! The function validates both operands against the configured dimension and
//! fails with a descriptive error on mismatch or an undecodable blob. Because
//! `rusqlite::Connection::serialize`/`deserialize` can hand the in-memory
//! page cache off to a fresh backing buffer, user-registered functions are
//! re-registered after every snapshot export as a defensive measure (see
//! `persistence::PersistenceQueue::persist_once`).

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::codec;
use crate::error::Result;

/// Register (or re-register) the `dot` scalar function for `dimension`.
pub fn register_dot(conn: &Connection, dimension: usize) -> Result<()> {
    conn.create_scalar_function(
        "dot",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let a: Vec<u8> = ctx.get(0)?;
            let b: Vec<u8> = ctx.get(1)?;

            let va = codec::decode(&a).map_err(to_sqlite_error)?;
            let vb = codec::decode(&b).map_err(to_sqlite_error)?;

            if va.len() != dimension || vb.len() != dimension {
                return Err(rusqlite::Error::UserFunctionError(
                    format!(
                        "dot() dimension mismatch: expected {dimension}, got {} and {}",
                        va.len(),
                        vb.len()
                    )
                    .into(),
                ));
            }

            let dot: f32 = va.iter().zip(vb.iter()).map(|(x, y)| x * y).sum();
            Ok(dot as f64)
        },
    )?;
    Ok(())
}

fn to_sqlite_error(e: crate::error::StoreError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(e.to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn dot_computes_cosine_when_inputs_are_normalized() {
        let conn = Connection::open_in_memory().unwrap();
        register_dot(&conn, 3).unwrap();
        let a = encode(&[1.0, 0.0, 0.0]);
        let b = encode(&[0.6, 0.8, 0.0]);
        let score: f64 = conn
            .query_row("SELECT dot(?1, ?2)", rusqlite::params![a, b], |row| row.get(0))
            .unwrap();
        assert!((score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn dot_rejects_dimension_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        register_dot(&conn, 3).unwrap();
        let a = encode(&[1.0, 0.0, 0.0]);
        let b = encode(&[1.0, 0.0]);
        let err = conn
            .query_row("SELECT dot(?1, ?2)", rusqlite::params![a, b], |row| row.get::<_, f64>(0))
            .unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }
}
