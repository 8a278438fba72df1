//! Public record types exchanged with callers.

use crate::metadata::RecordMetadata;

/// A vector record as supplied by callers for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub workbook_id: Option<String>,
    pub metadata: RecordMetadata,
}

/// A record returned from `get`/`list`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub metadata: RecordMetadata,
}

/// A metadata-only update, applied by id without touching the vector.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub id: String,
    pub workbook_id: Option<String>,
    pub metadata: RecordMetadata,
}

/// A single k-nearest-neighbor result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

/// A hash-catalog row for incremental indexing decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCatalogEntry {
    pub id: String,
    pub content_hash: Option<String>,
    pub metadata_hash: Option<String>,
}
