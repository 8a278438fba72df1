//! Retrieval orchestrator (`spec.md` §4.10): embeds a query, queries the
//! store scoped to a workbook, reranks, dedupes, and slices to `top_k`.
//!
//! Deliberately thin — the heavy lifting (persistence, the similarity
//! query, oversampling retries) lives in [`crate::store`]; this module only
//! wires an external [`Embedder`] to the store and to the
//! [`crate::rerank::Reranker`]/[`crate::dedupe::Deduper`] contracts.

use async_trait::async_trait;

use crate::cancellation::{self, CancellationToken};
use crate::dedupe::Deduper;
use crate::error::{Result, StoreError};
use crate::record::SearchResult;
use crate::rerank::Reranker;
use crate::store::{QueryOptions, VectorStore};

/// Text-to-vector collaborator, supplied by the host (out of scope per
/// `spec.md` §1 — consumed only through this trait).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(
        &self,
        texts: &[String],
        signal: Option<&CancellationToken>,
    ) -> Result<Vec<Vec<f32>>>;

    /// The dimension this embedder produces, if known ahead of calling it.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Arguments to [`search_workbook_rag`].
pub struct SearchWorkbookRagOptions<'a> {
    pub query_text: &'a str,
    pub workbook_id: &'a str,
    pub top_k: f64,
    pub rerank: bool,
    pub dedupe: bool,
    pub signal: Option<&'a CancellationToken>,
}

impl<'a> SearchWorkbookRagOptions<'a> {
    pub fn new(query_text: &'a str, workbook_id: &'a str) -> Self {
        Self {
            query_text,
            workbook_id,
            top_k: 8.0,
            rerank: true,
            dedupe: true,
            signal: None,
        }
    }
}

/// Query → embed → store.query → rerank → dedupe → slice.
///
/// Fails with [`StoreError::InvalidArgument`] for missing/invalid
/// parameters; propagates store and embedder errors unchanged.
pub async fn search_workbook_rag(
    opts: SearchWorkbookRagOptions<'_>,
    vector_store: &VectorStore,
    embedder: &dyn Embedder,
    reranker: &dyn Reranker,
    deduper: &dyn Deduper,
) -> Result<Vec<SearchResult>> {
    cancellation::check_opt(opts.signal)?;

    let trimmed_query = opts.query_text.trim();
    if trimmed_query.is_empty() {
        return Ok(Vec::new());
    }

    if !opts.top_k.is_finite() {
        return Err(StoreError::invalid_argument("topK must be finite"));
    }
    let top_k = opts.top_k.floor();
    if top_k <= 0.0 {
        return Ok(Vec::new());
    }
    let top_k = top_k as usize;

    if opts.workbook_id.trim().is_empty() {
        return Err(StoreError::invalid_argument("workbookId must be non-empty"));
    }

    let query_k = if opts.rerank || opts.dedupe {
        top_k.saturating_mul(4)
    } else {
        top_k
    };

    let embeddings = embedder
        .embed_texts(&[opts.query_text.to_string()], opts.signal)
        .await?;
    if embeddings.len() != 1 {
        return Err(StoreError::invalid_argument(
            "embedder must return exactly one vector for one query text",
        ));
    }
    let query_vector = &embeddings[0];
    if query_vector.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::invalid_argument(
            "embedder returned a non-finite vector component",
        ));
    }

    let expected_dimension = embedder.dimension().unwrap_or_else(|| vector_store.dimension());
    if query_vector.len() != expected_dimension {
        return Err(StoreError::DimensionMismatch {
            db_dimension: Some(expected_dimension),
            requested_dimension: Some(query_vector.len()),
            id: None,
        });
    }

    cancellation::check_opt(opts.signal)?;

    let raw_results = vector_store
        .query(
            query_vector,
            query_k as f64,
            QueryOptions {
                workbook_id: Some(opts.workbook_id),
                filter: None,
                signal: opts.signal,
            },
        )
        .await?;

    let mut results: Vec<SearchResult> = raw_results
        .into_iter()
        .filter(|r| {
            r.metadata
                .workbook_id
                .as_deref()
                .map_or(true, |w| w == opts.workbook_id)
        })
        .collect();

    if opts.rerank {
        results = reranker.rerank(opts.query_text, results);
    }
    if opts.dedupe {
        results = deduper.dedupe(results);
    }

    results.truncate(top_k);
    Ok(results)
}
