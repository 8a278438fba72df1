//! Metadata splitter: structured columns plus a free-form JSON extras map,
//! merged back into a single view on read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// A source region `(r0, c0)`..`(r1, c1)` that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub r0: i64,
    pub c0: i64,
    pub r1: i64,
    pub c1: i64,
}

impl Rect {
    /// Area of the rectangle; zero-area (degenerate) rectangles return 0.
    pub fn area(&self) -> i64 {
        let w = (self.r1 - self.r0).max(0);
        let h = (self.c1 - self.c0).max(0);
        w * h
    }

    /// Intersection area with another rectangle, or 0 when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> i64 {
        let r0 = self.r0.max(other.r0);
        let c0 = self.c0.max(other.c0);
        let r1 = self.r1.min(other.r1);
        let c1 = self.c1.min(other.c1);
        let w = (r1 - r0).max(0);
        let h = (c1 - c0).max(0);
        w * h
    }
}

/// The unified metadata view presented to callers: structured fields known to
/// the store, plus an arbitrary `extra` bag for anything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub workbook_id: Option<String>,
    pub sheet_name: Option<String>,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub rect: Option<Rect>,
    pub content_hash: Option<String>,
    pub metadata_hash: Option<String>,
    pub token_count: Option<u32>,
    pub text: Option<String>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// The set of columns that structured fields occupy; used to strip
/// conflicting keys out of `extra` before encoding, and to decide which keys
/// win on merge.
const STRUCTURED_KEYS: &[&str] = &[
    "workbookId",
    "sheetName",
    "kind",
    "title",
    "rect",
    "contentHash",
    "metadataHash",
    "tokenCount",
    "text",
];

/// Columnar form ready for SQL binding.
pub struct SplitColumns {
    pub workbook_id: Option<String>,
    pub sheet_name: Option<String>,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub r0: Option<i64>,
    pub c0: Option<i64>,
    pub r1: Option<i64>,
    pub c1: Option<i64>,
    pub content_hash: Option<String>,
    pub metadata_hash: Option<String>,
    pub token_count: Option<i64>,
    pub text: Option<String>,
    /// JSON-serialized extras; `"{}"` when empty.
    pub metadata_json: String,
}

impl RecordMetadata {
    /// Split into structured columns plus serialized extras.
    pub fn split(&self, workbook_id: Option<&str>) -> Result<SplitColumns> {
        let metadata_json = if self.extra.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string(&self.extra)
                .map_err(|e| StoreError::invalid_metadata(e.to_string()))?
        };

        Ok(SplitColumns {
            workbook_id: workbook_id.map(|s| s.to_string()).or_else(|| self.workbook_id.clone()),
            sheet_name: self.sheet_name.clone(),
            kind: self.kind.clone(),
            title: self.title.clone(),
            r0: self.rect.map(|r| r.r0),
            c0: self.rect.map(|r| r.c0),
            r1: self.rect.map(|r| r.r1),
            c1: self.rect.map(|r| r.c1),
            content_hash: self.content_hash.clone(),
            metadata_hash: self.metadata_hash.clone(),
            token_count: self.token_count.map(i64::from),
            text: self.text.clone(),
            metadata_json,
        })
    }

    /// Reconstruct a [`RecordMetadata`] from raw columns plus the serialized
    /// extras JSON, overlaying structured columns onto the parsed extras map
    /// (structured wins on key conflict) so callers see one unified view.
    #[allow(clippy::too_many_arguments)]
    pub fn merge(
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
    ) -> Result<Self> {
        let mut extra: Map<String, Value> = if metadata_json.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(metadata_json) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => Map::new(),
            }
        };
        for key in STRUCTURED_KEYS {
            extra.remove(*key);
        }

        let rect = match (r0, c0, r1, c1) {
            (Some(r0), Some(c0), Some(r1), Some(c1)) => Some(Rect { r0, c0, r1, c1 }),
            _ => None,
        };

        Ok(RecordMetadata {
            workbook_id,
            sheet_name,
            kind,
            title,
            rect,
            content_hash,
            metadata_hash,
            token_count: token_count.map(|n| n.max(0) as u32),
            text,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_empty_extra_encodes_empty_object() {
        let md = RecordMetadata::default();
        let cols = md.split(None).unwrap();
        assert_eq!(cols.metadata_json, "{}");
    }

    #[test]
    fn split_merge_round_trips_structured_and_extra() {
        let mut extra = Map::new();
        extra.insert("custom".into(), Value::String("value".into()));
        let md = RecordMetadata {
            workbook_id: Some("wb1".into()),
            sheet_name: Some("Sheet1".into()),
            kind: Some("table".into()),
            title: Some("Title".into()),
            rect: Some(Rect { r0: 0, c0: 0, r1: 5, c1: 5 }),
            content_hash: Some("ch".into()),
            metadata_hash: Some("mh".into()),
            token_count: Some(42),
            text: Some("hello".into()),
            extra,
        };
        let cols = md.split(None).unwrap();
        let merged = RecordMetadata::merge(
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
            &cols.metadata_json,
        )
        .unwrap();
        assert_eq!(merged, md);
    }

    #[test]
    fn structured_field_wins_over_conflicting_extra_key() {
        let mut extra = Map::new();
        extra.insert("kind".into(), Value::String("stale".into()));
        let merged = RecordMetadata::merge(
            None,
            None,
            Some("table".into()),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            &serde_json::to_string(&extra).unwrap(),
        )
        .unwrap();
        assert_eq!(merged.kind.as_deref(), Some("table"));
        assert!(!merged.extra.contains_key("kind"));
    }

    #[test]
    fn rect_intersection_area_disjoint_is_zero() {
        let a = Rect { r0: 0, c0: 0, r1: 2, c1: 2 };
        let b = Rect { r0: 5, c0: 5, r1: 7, c1: 7 };
        assert_eq!(a.intersection_area(&b), 0);
    }

    #[test]
    fn rect_intersection_area_overlap() {
        let a = Rect { r0: 0, c0: 0, r1: 4, c1: 4 };
        let b = Rect { r0: 2, c0: 2, r1: 6, c1: 6 };
        assert_eq!(a.intersection_area(&b), 4);
    }
}
