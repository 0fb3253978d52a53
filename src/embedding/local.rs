//! Local ONNX Runtime embedding backend.
//!
//! Runs the configured sentence-embedding model (default
//! `Xenova/nomic-embed-text-v1`) via `ort`: tokenize → forward pass →
//! attention-masked mean pooling → L2 normalization.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::EmbeddingProvider;

/// Token budget per input. Long chunks are truncated; the importer's chunk
/// sizes stay well under this.
const MAX_SEQ_LEN: usize = 512;

/// ONNX-backed [`EmbeddingProvider`].
pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_id: String,
    dims: usize,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex guaranteeing
// exclusive access during run().
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

impl LocalEmbeddingProvider {
    /// Load model artifacts from `model_dir`. `dims` is the configured
    /// vector width; a model producing anything else fails on first use.
    pub fn load(model_dir: &Path, model_id: &str, dims: usize) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `memo model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}. Run `memo model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tracing::info!(model = %model_path.display(), dims, "embedding model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_id: model_id.to_string(),
            dims,
        })
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let seq_len = encoding.get_ids().len();
        anyhow::ensure!(seq_len > 0, "tokenizer produced an empty sequence");

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids = vec![0i64; seq_len];

        let shape = vec![1i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        // Output name varies by export; fall back to the first output.
        let hidden_value = outputs
            .get("last_hidden_state")
            .or_else(|| outputs.get("token_embeddings"))
            .unwrap_or_else(|| &outputs[0]);

        let (out_shape, data) = hidden_value
            .try_extract_tensor::<f32>()
            .context("failed to extract hidden-state tensor")?;

        let out_dims: &[i64] = &out_shape;
        anyhow::ensure!(
            out_dims.len() == 3 && out_dims[2] == self.dims as i64,
            "model produced hidden shape {out_dims:?}, expected [1, seq, {}]; \
             check the embeddingDimensions config against the model",
            self.dims
        );
        let hidden_dim = out_dims[2] as usize;
        let actual_seq_len = out_dims[1] as usize;

        // Mean pooling over non-padding tokens.
        let mut sum = vec![0.0f32; hidden_dim];
        let mut count = 0.0f32;
        for s in 0..actual_seq_len {
            let mask = attention_mask.get(s).copied().unwrap_or(0) as f32;
            if mask > 0.0 {
                let offset = s * hidden_dim;
                for d in 0..hidden_dim {
                    sum[d] += data[offset + d] * mask;
                }
                count += mask;
            }
        }
        if count > 0.0 {
            for value in &mut sum {
                *value /= count;
            }
        }

        Ok(l2_normalize(&sum))
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
