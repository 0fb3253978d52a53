//! Core memory engine — records, storage, retrieval, and deduplication.
//!
//! The write path lives in [`store`], hybrid retrieval in [`search`], the
//! duplicate gate in [`dedup`]. Type definitions live in [`types`].

pub mod dedup;
pub mod search;
pub mod store;
pub mod types;

/// View an f32 embedding slice as raw bytes for sqlite-vec.
///
/// vec0 expects a contiguous little-endian float32 buffer; on the platforms
/// we target the in-memory layout already is one, so this is a zero-copy
/// reinterpretation.
pub fn vector_to_bytes(vector: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            vector.as_ptr() as *const u8,
            std::mem::size_of_val(vector),
        )
    }
}

/// Decode a little-endian float32 BLOB back into a vector.
pub fn bytes_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let bytes = vector_to_bytes(&v).to_vec();
        assert_eq!(bytes.len(), v.len() * 4);
        assert_eq!(bytes_to_vector(&bytes), v);
    }

    #[test]
    fn empty_vector_is_empty_blob() {
        let v: Vec<f32> = vec![];
        assert!(vector_to_bytes(&v).is_empty());
        assert!(bytes_to_vector(&[]).is_empty());
    }
}
