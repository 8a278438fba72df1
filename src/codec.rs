//! Vector blob codec: 32-bit float little-endian packing, L2 normalization,
//! and alignment-safe decoding.

use crate::error::{Result, StoreError};

/// Encode a vector of `f32`s into a contiguous little-endian byte buffer.
///
/// Byte length is always `4 * vector.len()`.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian byte blob into a vector of `f32`s.
///
/// Fails with [`StoreError::InvalidBlobLength`] when `bytes.len()` is not a
/// multiple of 4. The blob need not be 4-byte aligned in memory — a raw
/// `Vec<u8>` has no alignment guarantee beyond 1, so this always copies via
/// `chunks_exact`, which repairs any misalignment implicitly.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::InvalidBlobLength {
            id: None,
            length: bytes.len(),
            dimension: None,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode and validate that the resulting vector has exactly `dimension`
/// components, naming `id` in the error on mismatch.
pub fn decode_validated(bytes: &[u8], dimension: usize, id: &str) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 || bytes.len() != dimension * 4 {
        return Err(StoreError::InvalidBlobLength {
            id: Some(id.to_string()),
            length: bytes.len(),
            dimension: Some(dimension),
        });
    }
    decode(bytes)
}

/// L2-normalize a vector in place semantics (returns a new vector).
///
/// If the Euclidean norm is zero or non-finite, returns the zero vector of
/// the same length rather than dividing by zero / producing NaNs.
pub fn normalize_l2(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Validate that `vector` has exactly `dimension` components and that every
/// component is finite. Non-finite inputs are rejected at write time per the
/// design's open-question resolution (see `SPEC_FULL.md` §9).
pub fn validate_dimension(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            db_dimension: Some(dimension),
            requested_dimension: Some(vector.len()),
            id: None,
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::invalid_argument(
            "vector contains non-finite components",
        ));
    }
    Ok(())
}
