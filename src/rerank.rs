//! Reranker: deterministic additive score adjustments (`spec.md` §4.11).
//!
//! Pure, synchronous, and stateless given its [`RerankOptions`] — consumed
//! by the orchestrator as a trait object so hosts can swap in their own
//! heuristics without touching the store.

use std::collections::HashMap;

use crate::record::SearchResult;

/// Tunable weights for [`DefaultReranker`]. Defaults are the crate's own
/// choice (`spec.md` leaves the exact constants to the implementation); see
/// `DESIGN.md` for the rationale.
#[derive(Debug, Clone)]
pub struct RerankOptions {
    pub kind_boost: HashMap<String, f32>,
    pub title_token_boost: f32,
    pub sheet_token_boost: f32,
    pub token_penalty_threshold: u32,
    pub token_penalty_scale: f32,
    pub token_penalty_max: f32,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            kind_boost: HashMap::new(),
            title_token_boost: 0.05,
            sheet_token_boost: 0.03,
            token_penalty_threshold: 256,
            token_penalty_scale: 0.0005,
            token_penalty_max: 0.1,
        }
    }
}

/// Pure function from `(queryText, results)` to re-scored, re-sorted
/// results (`spec.md` §6).
pub trait Reranker: Send + Sync {
    fn rerank(&self, query_text: &str, results: Vec<SearchResult>) -> Vec<SearchResult>;
}

/// The reranker `spec.md` §4.11 describes: kind boosts, per-token
/// title/sheet-name boosts, and a token-count penalty above a threshold.
pub struct DefaultReranker {
    options: RerankOptions,
}

impl DefaultReranker {
    pub fn new(options: RerankOptions) -> Self {
        Self { options }
    }
}

impl Default for DefaultReranker {
    fn default() -> Self {
        Self::new(RerankOptions::default())
    }
}

impl Reranker for DefaultReranker {
    fn rerank(&self, query_text: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let tokens: Vec<String> = query_text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let mut scored: Vec<(usize, SearchResult)> = results
            .into_iter()
            .enumerate()
            .map(|(original_index, mut result)| {
                let mut adjusted = result.score;

                if let Some(kind) = &result.metadata.kind {
                    if let Some(boost) = self.options.kind_boost.get(kind) {
                        adjusted += boost;
                    }
                }

                if !tokens.is_empty() {
                    if let Some(title) = &result.metadata.title {
                        let title_lower = title.to_lowercase();
                        let hits = tokens.iter().filter(|t| title_lower.contains(t.as_str())).count();
                        adjusted += hits as f32 * self.options.title_token_boost;
                    }
                    if let Some(sheet) = &result.metadata.sheet_name {
                        let sheet_lower = sheet.to_lowercase();
                        let hits = tokens.iter().filter(|t| sheet_lower.contains(t.as_str())).count();
                        adjusted += hits as f32 * self.options.sheet_token_boost;
                    }
                }

                if let Some(token_count) = result.metadata.token_count {
                    if token_count > self.options.token_penalty_threshold {
                        let over = (token_count - self.options.token_penalty_threshold) as f32;
                        let penalty = (over * self.options.token_penalty_scale)
                            .min(self.options.token_penalty_max);
                        adjusted -= penalty;
                    }
                }

                result.score = adjusted;
                (original_index, result)
            })
            .collect();

        scored.sort_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ia.cmp(ib))
                .then_with(|| a.id.cmp(&b.id))
        });

        scored.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RecordMetadata;

    fn result(id: &str, score: f32, kind: Option<&str>, title: Option<&str>, token_count: Option<u32>) -> SearchResult {
        let mut metadata = RecordMetadata::default();
        metadata.kind = kind.map(str::to_string);
        metadata.title = title.map(str::to_string);
        metadata.token_count = token_count;
        SearchResult {
            id: id.to_string(),
            score,
            metadata,
        }
    }

    #[test]
    fn kind_boost_changes_ranking() {
        let mut kind_boost = HashMap::new();
        kind_boost.insert("table".to_string(), 0.5);
        let reranker = DefaultReranker::new(RerankOptions {
            kind_boost,
            ..RerankOptions::default()
        });

        let results = vec![
            result("a", 0.9, Some("chart"), None, None),
            result("b", 0.8, Some("table"), None, None),
        ];
        let reranked = reranker.rerank("", results);
        assert_eq!(reranked[0].id, "b");
    }

    #[test]
    fn title_token_match_boosts_score() {
        let reranker = DefaultReranker::default();
        let results = vec![
            result("a", 0.5, None, Some("Quarterly Revenue"), None),
            result("b", 0.5, None, Some("Unrelated Sheet"), None),
        ];
        let reranked = reranker.rerank("revenue", results);
        assert_eq!(reranked[0].id, "a");
        assert!(reranked[0].score > 0.5);
    }

    #[test]
    fn token_count_penalty_reduces_score_above_threshold() {
        let reranker = DefaultReranker::default();
        let results = vec![result("a", 0.9, None, None, Some(1000))];
        let reranked = reranker.rerank("", results);
        assert!(reranked[0].score < 0.9);
    }

    #[test]
    fn ties_fall_back_to_original_order_then_id() {
        let reranker = DefaultReranker::default();
        let results = vec![
            result("z", 0.5, None, None, None),
            result("a", 0.5, None, None, None),
        ];
        let reranked = reranker.rerank("", results);
        assert_eq!(reranked[0].id, "z");
    }
}
