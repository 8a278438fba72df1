//! Deduper: suppress near-duplicate region results (`spec.md` §4.12).
//!
//! Two results are considered overlapping duplicates when they share
//! `workbookId` and `sheetName` and their rectangles overlap by more than
//! `overlap_ratio_threshold` of the smaller rectangle's area. Scans in
//! current order, keeping the first occurrence and dropping anything
//! covered by an already-kept result.

use crate::metadata::Rect;
use crate::record::SearchResult;

#[derive(Debug, Clone, Copy)]
pub struct DedupeOptions {
    pub overlap_ratio_threshold: f32,
}

impl Default for DedupeOptions {
    fn default() -> Self {
        Self {
            overlap_ratio_threshold: 0.6,
        }
    }
}

/// Pure function from `results` to a deduplicated, order-preserving subset
/// (`spec.md` §6).
pub trait Deduper: Send + Sync {
    fn dedupe(&self, results: Vec<SearchResult>) -> Vec<SearchResult>;
}

pub struct DefaultDeduper {
    options: DedupeOptions,
}

impl DefaultDeduper {
    pub fn new(options: DedupeOptions) -> Self {
        Self { options }
    }
}

impl Default for DefaultDeduper {
    fn default() -> Self {
        Self::new(DedupeOptions::default())
    }
}

fn is_duplicate(candidate: &SearchResult, kept: &SearchResult, threshold: f32) -> bool {
    if candidate.metadata.workbook_id != kept.metadata.workbook_id {
        return false;
    }
    let Some(sheet) = &candidate.metadata.sheet_name else {
        return false;
    };
    if kept.metadata.sheet_name.as_deref() != Some(sheet.as_str()) {
        return false;
    }

    let (Some(a), Some(b)): (Option<Rect>, Option<Rect>) =
        (candidate.metadata.rect, kept.metadata.rect)
    else {
        return false;
    };

    let overlap = a.intersection_area(&b);
    if overlap <= 0 {
        return false;
    }

    let smaller_area = a.area().min(b.area()).max(1) as f32;
    (overlap as f32 / smaller_area) > threshold
}

impl Deduper for DefaultDeduper {
    fn dedupe(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut kept: Vec<SearchResult> = Vec::with_capacity(results.len());

        'candidates: for candidate in results {
            for existing in &kept {
                if is_duplicate(&candidate, existing, self.options.overlap_ratio_threshold) {
                    continue 'candidates;
                }
            }
            kept.push(candidate);
        }

        kept
    }
}
