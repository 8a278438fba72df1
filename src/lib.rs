//! # sheetvec
//!
//! A persistent, embedded vector store for retrieval-augmented search over
//! spreadsheet-derived chunks. It maps stable string identifiers to
//! fixed-dimension vectors plus structured metadata, and supports upserts,
//! deletions, metadata-only updates, exact k-nearest-neighbor search by
//! cosine similarity, incremental-indexing hash state, scoped queries by
//! workbook, and durable persistence through a pluggable byte-array backend.
//!
//! ## Layout
//!
//! - [`store`] — the persistent vector index itself: on-disk schema
//!   ([`schema`]), vector blob codec ([`codec`]), the `dot()` scalar
//!   similarity function ([`similarity`]), the write/read paths, and store
//!   lifecycle (open/create/reset-on-corrupt, close).
//! - [`persistence`] — dirty tracking, FIFO-serialized snapshot export, and
//!   batched-write suppression.
//! - [`storage`] — the pluggable `ByteStorage` backend (`MemoryStorage`,
//!   `FileStorage`, `ChunkedStorage`).
//! - [`metadata`] — the structured/extras metadata splitter.
//! - [`orchestrator`] — the thin retrieval orchestrator that embeds a query,
//!   queries the store, reranks ([`rerank`]), and dedupes ([`dedupe`]).
//! - [`error`] — the stable `StoreError` taxonomy surfaced at the boundary.
//! - [`cancellation`] — the cooperative cancellation token threaded through
//!   every suspension point.

pub mod cancellation;
pub mod codec;
pub mod dedupe;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod persistence;
pub mod record;
pub mod rerank;
pub mod schema;
pub mod similarity;
pub mod storage;
pub mod store;

pub use cancellation::CancellationToken;
pub use dedupe::{DedupeOptions, DefaultDeduper, Deduper};
pub use error::{Result, StoreError};
pub use metadata::{Rect, RecordMetadata};
pub use orchestrator::{search_workbook_rag, Embedder, SearchWorkbookRagOptions};
pub use record::{HashCatalogEntry, MetadataUpdate, SearchResult, StoredRecord, VectorRecord};
pub use rerank::{DefaultReranker, RerankOptions, Reranker};
pub use storage::{ByteStorage, ChunkedStorage, FileStorage, MemoryStorage};
pub use store::{ListOptions, QueryOptions, StoreOptions, StoreStats, VectorStore};
