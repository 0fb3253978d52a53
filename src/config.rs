//! Configuration loading.
//!
//! Defaults overlaid with `<user-config-dir>/memo/config.jsonc` (or
//! `config.json`). The file is JSON with comments; see [`crate::jsonc`].
//! The resulting [`MemoConfig`] is constructed once at startup and never
//! mutated afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoConfig {
    /// Global root for model artifacts and other shared state.
    pub storage_path: PathBuf,
    /// Hugging Face id of the embedding model.
    pub embedding_model: String,
    /// Width of stored vectors. Fixed per store after first write.
    pub embedding_dimensions: usize,
    /// Final quality gate on reported similarity.
    pub similarity_threshold: f64,
    /// Minimum cosine similarity for a KNN candidate to enter fusion.
    pub min_vector_similarity: f64,
    /// Default result limit for search and list.
    pub max_memories: usize,
    /// Gate on the duplicate check at insert.
    pub deduplication_enabled: bool,
    /// Cosine similarity at which an insert counts as a near duplicate.
    pub deduplication_similarity_threshold: f64,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            storage_path: default_memo_dir().join("data"),
            embedding_model: "Xenova/nomic-embed-text-v1".into(),
            embedding_dimensions: 768,
            similarity_threshold: 0.5,
            min_vector_similarity: 0.6,
            max_memories: 10,
            deduplication_enabled: true,
            deduplication_similarity_threshold: 0.9,
        }
    }
}

/// Returns `<user-config-dir>/memo`.
pub fn default_memo_dir() -> PathBuf {
    dirs::config_dir()
        .expect("user config directory must exist")
        .join("memo")
}

impl MemoConfig {
    /// Load config from the default location, writing a commented-out
    /// template on first start.
    pub fn load() -> Result<Self> {
        let dir = default_memo_dir();
        let jsonc_path = dir.join("config.jsonc");
        let json_path = dir.join("config.json");

        if jsonc_path.exists() {
            return Self::load_from(&jsonc_path);
        }
        if json_path.exists() {
            return Self::load_from(&json_path);
        }

        write_template(&jsonc_path)?;
        info!(path = %jsonc_path.display(), "wrote config template, using defaults");
        Ok(Self::default())
    }

    /// Load from a specific file. Missing keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let stripped = crate::jsonc::strip(&contents);
        let config: MemoConfig = serde_json::from_str(&stripped)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Directory holding the ONNX artifacts for the configured model.
    pub fn model_dir(&self) -> PathBuf {
        self.storage_path
            .join("models")
            .join(self.embedding_model.replace('/', "--"))
    }
}

/// First-start template: every option present, every option commented out.
fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let defaults = MemoConfig::default();
    let template = format!(
        r#"{{
  // memo configuration. Uncomment a key to override its default.

  // Global root for model artifacts and shared state.
  // "storagePath": "{storage}",

  // Embedding model (Hugging Face id). Changing it invalidates the
  // persistent embedding cache naturally via the cache key.
  // "embeddingModel": "{model}",

  // Vector width. Must match the model output; fixed per store.
  // "embeddingDimensions": {dims},

  // Final similarity cutoff applied to search results.
  // "similarityThreshold": {sim},

  // Cosine similarity a vector candidate must clear to be considered.
  // "minVectorSimilarity": {min_vec},

  // Default number of results for search and list.
  // "maxMemories": {max},

  // Block inserts that duplicate existing content.
  // "deduplicationEnabled": {dedup},

  // Cosine similarity at which an insert counts as a near duplicate.
  // "deduplicationSimilarityThreshold": {dedup_thresh}
}}
"#,
        storage = defaults.storage_path.display(),
        model = defaults.embedding_model,
        dims = defaults.embedding_dimensions,
        sim = defaults.similarity_threshold,
        min_vec = defaults.min_vector_similarity,
        max = defaults.max_memories,
        dedup = defaults.deduplication_enabled,
        dedup_thresh = defaults.deduplication_similarity_threshold,
    );
    std::fs::write(path, template)
        .with_context(|| format!("failed to write config template {}", path.display()))?;
    Ok(())
}
