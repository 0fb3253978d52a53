//! Text → unit-length vector, with two cache tiers in front of inference.
//!
//! Every text is prefixed with `clustering: ` before hashing or inference.
//! The prefix is symmetric between stored content and queries, so identical
//! text always produces an identical vector; dedup and the hybrid score
//! normalisation both rely on this.
//!
//! Lookup order: L1 (in-process FIFO map) → L2 (persistent
//! `embedding_cache` table) → model inference under a 30 s deadline. The
//! model itself is a process-wide singleton loaded on the first cache miss;
//! concurrent callers during the load wait on the same initialisation.

pub mod local;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::config::MemoConfig;
use crate::error::MemoError;
use crate::memory::store::Store;

/// Task prefix fed to the model for both documents and queries. A contract,
/// not a tunable.
pub const EMBED_PREFIX: &str = "clustering: ";

/// Hard deadline on a single inference call.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// L1 cache capacity (entries).
const L1_CAPACITY: usize = 100;

/// A text-to-vector backend. Implementations produce L2-normalized vectors
/// and are called from `spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, part of the persistent cache key.
    fn model_id(&self) -> &str;

    /// Vector width this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed one (already prefixed) text. Blocking.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

enum ProviderSource {
    /// An injected backend (tests).
    Fixed(Arc<dyn EmbeddingProvider>),
    /// The process-wide local model, loaded on first miss.
    Lazy(MemoConfig),
}

/// Cached embedding front-end.
///
/// Cheap to construct: the cache tiers are consulted with nothing but the
/// model id and dimension from config, and the model is only loaded when a
/// text actually misses both tiers.
pub struct Embedder {
    model_id: String,
    dims: usize,
    source: ProviderSource,
    l1: Mutex<FifoCache>,
}

impl Embedder {
    /// Embedder over an explicit backend.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            model_id: provider.model_id().to_string(),
            dims: provider.dimensions(),
            source: ProviderSource::Fixed(provider),
            l1: Mutex::new(FifoCache::new(L1_CAPACITY)),
        }
    }

    /// Embedder over the configured local model, deferring the load until a
    /// cache miss requires inference.
    pub fn lazy(config: &MemoConfig) -> Self {
        Self {
            model_id: config.embedding_model.clone(),
            dims: config.embedding_dimensions,
            source: ProviderSource::Lazy(config.clone()),
            l1: Mutex::new(FifoCache::new(L1_CAPACITY)),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    /// Embed `text`, consulting L1, then the store's persistent cache, then
    /// the model. Cache writes to the store are best-effort.
    pub async fn embed(&self, store: &Store, text: &str) -> Result<Vec<f32>> {
        let prefixed = format!("{EMBED_PREFIX}{text}");

        if let Some(vector) = self.l1.lock().expect("l1 cache lock").get(&prefixed) {
            return Ok(vector);
        }

        let content_hash = sha256_hex(&prefixed);
        match store.get_cached_embedding(&content_hash, &self.model_id) {
            Ok(Some(vector)) if vector.len() == self.dims => {
                self.l1
                    .lock()
                    .expect("l1 cache lock")
                    .put(prefixed, vector.clone());
                return Ok(vector);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "embedding cache read failed"),
        }

        let provider = match &self.source {
            ProviderSource::Fixed(provider) => Arc::clone(provider),
            ProviderSource::Lazy(config) => load_local_model(config).await?,
        };

        let input = prefixed.clone();
        let task = tokio::task::spawn_blocking(move || provider.embed(&input));
        let vector = match tokio::time::timeout(EMBED_TIMEOUT, task).await {
            Err(_) => return Err(MemoError::EmbeddingTimeout(EMBED_TIMEOUT).into()),
            Ok(Err(join_err)) => {
                return Err(MemoError::Embedding(join_err.to_string()).into())
            }
            Ok(Ok(Err(e))) => return Err(MemoError::Embedding(e.to_string()).into()),
            Ok(Ok(Ok(vector))) => vector,
        };

        if vector.len() != self.dims {
            return Err(MemoError::Embedding(format!(
                "model returned {} dimensions, expected {}",
                vector.len(),
                self.dims
            ))
            .into());
        }

        self.l1
            .lock()
            .expect("l1 cache lock")
            .put(prefixed, vector.clone());

        if let Err(e) = store.put_cached_embedding(&content_hash, &self.model_id, &vector) {
            tracing::warn!(error = %e, "embedding cache write failed");
        }

        Ok(vector)
    }
}

/// Insertion-ordered map with FIFO eviction. No recency tracking: the oldest
/// entry goes first regardless of hits.
struct FifoCache {
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl FifoCache {
    fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: String, vector: Vec<f32>) {
        if self.map.insert(key.clone(), vector).is_none() {
            self.order.push_back(key);
            if self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
    }
}

/// Hex SHA-256 of a text, the persistent cache key component.
pub fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ── Process-wide model singleton ──────────────────────────────────────────────

static LOCAL_MODEL: tokio::sync::Mutex<Option<Arc<local::LocalEmbeddingProvider>>> =
    tokio::sync::Mutex::const_new(None);

/// Load (once) and return the process-wide local model. Callers arriving
/// while another is mid-load block on the same initialisation and share its
/// result.
async fn load_local_model(config: &MemoConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let mut slot = LOCAL_MODEL.lock().await;
    if slot.is_none() {
        let model_dir = config.model_dir();
        let model_id = config.embedding_model.clone();
        let dims = config.embedding_dimensions;
        let provider = tokio::task::spawn_blocking(move || {
            local::LocalEmbeddingProvider::load(&model_dir, &model_id, dims)
        })
        .await
        .map_err(|e| MemoError::Embedding(e.to_string()))??;
        *slot = Some(Arc::new(provider));
    }
    Ok(Arc::clone(slot.as_ref().expect("just initialised")) as Arc<dyn EmbeddingProvider>)
}

/// Drop the process-wide model. Tests use this to isolate cases; the next
/// miss reloads.
pub async fn reset() {
    *LOCAL_MODEL.lock().await = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic provider: vector derived from the text's hash bytes.
    struct HashProvider {
        dims: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl HashProvider {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingProvider for HashProvider {
        fn model_id(&self) -> &str {
            "hash-test-model"
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let digest = Sha256::digest(text.as_bytes());
            let mut v: Vec<f32> = digest
                .iter()
                .cycle()
                .take(self.dims)
                .map(|b| *b as f32 + 1.0)
                .collect();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter_mut().for_each(|x| *x /= norm);
            Ok(v)
        }
    }

    fn test_setup() -> (Store, Embedder, Arc<HashProvider>) {
        let store = Store::open_in_memory(8).unwrap();
        let provider = Arc::new(HashProvider::new(8));
        let embedder = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>);
        (store, embedder, provider)
    }

    fn call_count(provider: &HashProvider) -> usize {
        provider.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[tokio::test]
    async fn embed_is_deterministic_and_unit_length() {
        let (store, embedder, _) = test_setup();
        let a = embedder.embed(&store, "hello world").await.unwrap();
        let b = embedder.embed(&store, "hello world").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn l1_hit_skips_inference() {
        let (store, embedder, provider) = test_setup();
        embedder.embed(&store, "cached text").await.unwrap();
        assert_eq!(call_count(&provider), 1);
        embedder.embed(&store, "cached text").await.unwrap();
        assert_eq!(call_count(&provider), 1);
    }

    #[tokio::test]
    async fn l2_hit_survives_a_fresh_l1() {
        let (store, embedder, provider) = test_setup();
        let first = embedder.embed(&store, "persisted text").await.unwrap();
        assert_eq!(call_count(&provider), 1);

        // New Embedder, same provider and store: L1 is empty, L2 is warm.
        let embedder2 = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>);
        let second = embedder2.embed(&store, "persisted text").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(call_count(&provider), 1, "L2 hit must not re-run inference");
    }

    #[tokio::test]
    async fn cache_key_includes_the_prefix() {
        let (store, embedder, _) = test_setup();
        embedder.embed(&store, "some text").await.unwrap();

        let hash = sha256_hex(&format!("{EMBED_PREFIX}some text"));
        assert!(store
            .get_cached_embedding(&hash, "hash-test-model")
            .unwrap()
            .is_some());

        let unprefixed = sha256_hex("some text");
        assert!(store
            .get_cached_embedding(&unprefixed, "hash-test-model")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn model_switch_misses_the_cache() {
        let (store, embedder, _) = test_setup();
        embedder.embed(&store, "shared text").await.unwrap();

        struct Renamed(HashProvider);
        impl EmbeddingProvider for Renamed {
            fn model_id(&self) -> &str {
                "other-model"
            }
            fn dimensions(&self) -> usize {
                self.0.dimensions()
            }
            fn embed(&self, text: &str) -> Result<Vec<f32>> {
                self.0.embed(text)
            }
        }
        let renamed = Arc::new(Renamed(HashProvider::new(8)));
        let embedder2 = Embedder::new(Arc::clone(&renamed) as Arc<dyn EmbeddingProvider>);
        embedder2.embed(&store, "shared text").await.unwrap();
        assert_eq!(
            renamed.0.calls.load(std::sync::atomic::Ordering::SeqCst),
            1,
            "different model id must re-embed"
        );
    }

    #[tokio::test]
    async fn cached_vector_with_wrong_width_is_ignored() {
        let (store, embedder, provider) = test_setup();
        // Poison L2 with a stale, differently-sized vector under the key
        // this text will hash to.
        let hash = sha256_hex(&format!("{EMBED_PREFIX}resized"));
        store
            .put_cached_embedding(&hash, "hash-test-model", &[0.5f32; 4])
            .unwrap();

        let vector = embedder.embed(&store, "resized").await.unwrap();
        assert_eq!(vector.len(), 8);
        assert_eq!(call_count(&provider), 1, "stale entry must not be served");
    }

    #[test]
    fn fifo_evicts_oldest() {
        let mut cache = FifoCache::new(2);
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);
        cache.put("c".into(), vec![3.0]);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }

    #[test]
    fn fifo_overwrite_does_not_grow_order() {
        let mut cache = FifoCache::new(2);
        cache.put("a".into(), vec![1.0]);
        cache.put("a".into(), vec![9.0]);
        cache.put("b".into(), vec![2.0]);
        // "a" was inserted once; updating it must not evict anything yet.
        assert_eq!(cache.get("a"), Some(vec![9.0]));
        assert_eq!(cache.get("b"), Some(vec![2.0]));
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
