#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use memo::embedding::{Embedder, EmbeddingProvider, EMBED_PREFIX};
use memo::memory::store::Store;
use memo::memory::types::MemoryRecord;
use sha2::{Digest, Sha256};

pub const DIMS: usize = 16;

/// Fresh in-memory store with the test dimensionality.
pub fn test_store() -> Store {
    Store::open_in_memory(DIMS).unwrap()
}

/// Deterministic unit vector with a spike at `seed`. Distinct seeds are
/// orthogonal.
pub fn spike(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[seed % DIMS] = 1.0;
    v
}

/// Unit vector close to `base` (cosine similarity ≈ 0.995).
pub fn similar_to(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..3 {
        v[(i * 5) % DIMS] += 0.06;
    }
    normalize(&mut v);
    v
}

pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x * y) as f64).sum()
}

/// Insert a record with an explicit vector, returning its id.
pub fn insert_memory(store: &mut Store, content: &str, vector: Vec<f32>, container: &str) -> String {
    let mut record = MemoryRecord::new(content.to_string(), vector, container.to_string());
    store.insert(&mut record).unwrap();
    record.id
}

/// Deterministic offline embedding backend.
///
/// Texts registered with [`StubProvider::map`] get the given vector; anything
/// else falls back to a unit vector derived from the text's SHA-256, so
/// distinct texts embed far apart and identical texts embed identically —
/// the property the pipeline actually relies on.
pub struct StubProvider {
    mapped: Mutex<HashMap<String, Vec<f32>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            mapped: Mutex::new(HashMap::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Pin the embedding of `text` (unprefixed, as a caller would pass it).
    pub fn map(&self, text: &str, mut vector: Vec<f32>) {
        normalize(&mut vector);
        self.mapped
            .lock()
            .unwrap()
            .insert(format!("{EMBED_PREFIX}{text}"), vector);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl EmbeddingProvider for StubProvider {
    fn model_id(&self) -> &str {
        "stub-test-model"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(v) = self.mapped.lock().unwrap().get(text) {
            return Ok(v.clone());
        }
        let digest = Sha256::digest(text.as_bytes());
        let mut v: Vec<f32> = digest
            .iter()
            .cycle()
            .take(DIMS)
            .map(|b| *b as f32 + 1.0)
            .collect();
        normalize(&mut v);
        Ok(v)
    }
}

/// Embedder over a fresh stub provider.
pub fn stub_embedder() -> (Embedder, Arc<StubProvider>) {
    let provider = Arc::new(StubProvider::new());
    let embedder = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>);
    (embedder, provider)
}
