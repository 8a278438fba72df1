//! Stable error taxonomy surfaced at the crate boundary.
//!
//! Every public operation returns [`StoreError`]. Variant names match the
//! stable strings callers are expected to match against; structured fields
//! (e.g. `db_dimension`/`requested_dimension`) carry enough context to act on
//! the error without parsing messages.

use thiserror::Error;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing/empty workbook id, non-finite k/dimension, wrong-shape input.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Dimension mismatch at open time, write time, or read time.
    #[error(
        "dimension mismatch: db_dimension={db_dimension:?} requested_dimension={requested_dimension:?}{}",
        id.as_deref().map(|i| format!(" id={i}")).unwrap_or_default()
    )]
    DimensionMismatch {
        db_dimension: Option<usize>,
        requested_dimension: Option<usize>,
        id: Option<String>,
    },

    /// Unreadable snapshot or malformed store metadata.
    #[error("invalid metadata: {message}")]
    InvalidMetadata { message: String },

    /// Decoded vector blob length is not a multiple of 4, or does not equal
    /// `dimension * 4`.
    #[error("invalid blob length: id={id:?} length={length} dimension={dimension:?}")]
    InvalidBlobLength {
        id: Option<String>,
        length: usize,
        dimension: Option<usize>,
    },

    /// Cooperative cancellation was observed at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// `ByteStorage::load`/`save`/`remove` failed.
    #[error("storage failure: {message}")]
    StorageFailure { message: String },

    /// Error surfaced by the relational engine that doesn't fit another
    /// category, wrapped with enough context to identify the offending
    /// record where possible.
    #[error("engine error: {message}")]
    Engine { message: String },
}

impl StoreError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        StoreError::InvalidMetadata {
            message: message.into(),
        }
    }

    pub fn storage_failure(message: impl Into<String>) -> Self {
        StoreError::StorageFailure {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        StoreError::Engine {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Engine {
            message: e.to_string(),
        }
    }
}
