//! Candle-based sentence embeddings for BERT-family models.
//!
//! Defaults to BAAI/bge-small-en-v1.5 (384 dimensions). Uses CLS-token pooling
//! followed by L2 normalization, matching how BGE models are meant to be used.

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::Number;
use crate::embedding::{EmbedderConfig, EmbeddingProvider};
use crate::error::EmbeddingError;
use crate::vector_ops::normalize_vector;

/// Maximum sequence length in tokens
pub const MAX_SEQ_LENGTH: usize = 512;

/// Texts per forward pass
pub const EMBED_BATCH_SIZE: usize = 32;

/// Files a model directory must contain
pub const MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// Paths to model files
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelPaths {
    fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        }
    }
}

/// Finds model files: a directory `model_id` is used as-is, anything else is
/// treated as a hub repository id and fetched (or read from the hub cache).
pub fn resolve_model(config: &EmbedderConfig) -> Result<ModelPaths, EmbeddingError> {
    let local = Path::new(&config.model_id);
    if local.is_dir() {
        if let Some(missing) = MODEL_FILES.iter().find(|f| !local.join(f).exists()) {
            return Err(EmbeddingError::ModelNotFound(format!(
                "{} is missing {}",
                local.display(),
                missing
            )));
        }
        debug!(path = %local.display(), "Using local model directory");
        return Ok(ModelPaths::in_dir(local));
    }
    download_model_files(config)
}

fn download_model_files(config: &EmbedderConfig) -> Result<ModelPaths, EmbeddingError> {
    use hf_hub::api::sync::ApiBuilder;

    let mut builder = ApiBuilder::new();
    if let Some(dir) = &config.cache_dir {
        builder = builder.with_cache_dir(dir.clone());
    }
    let api = builder
        .build()
        .map_err(|e| EmbeddingError::Download(e.to_string()))?;
    let repo = api.model(config.model_id.clone());

    info!(repo = %config.model_id, "Fetching model files");
    let fetch = |filename: &str| {
        repo.get(filename)
            .map_err(|e| EmbeddingError::Download(format!("{}: {}", filename, e)))
    };

    Ok(ModelPaths {
        config: fetch("config.json")?,
        tokenizer: fetch("tokenizer.json")?,
        weights: fetch("model.safetensors")?,
    })
}

/// BERT sentence embedder running on the CPU.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    name: String,
}

impl CandleEmbedder {
    pub fn load(config: &EmbedderConfig) -> Result<Self, EmbeddingError> {
        let paths = resolve_model(config)?;
        Self::load_from_paths(&config.model_id, &paths)
    }

    pub fn load_from_paths(name: &str, paths: &ModelPaths) -> Result<Self, EmbeddingError> {
        info!(model = name, "Loading embedding model...");

        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(&paths.config)?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;
        let dimension = hidden_size(&config_str)?;

        let mut tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        truncate_to(&mut tokenizer, MAX_SEQ_LENGTH)?;

        // Safety: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[paths.weights.clone()], DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        info!(model = name, dim = dimension, "Model loaded successfully");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn embed_slice(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>, EmbeddingError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut ids_flat = Vec::with_capacity(texts.len() * max_len);
        let mut mask_flat = Vec::with_capacity(texts.len() * max_len);
        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.resize(max_len, 0);
            mask.resize(max_len, 0);
            ids_flat.extend(ids);
            mask_flat.extend(mask);
        }

        let shape = (texts.len(), max_len);
        let input_ids = Tensor::from_vec(ids_flat, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask_flat, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // CLS token of each sequence
        let pooled = output.i((.., 0))?;
        let mut vectors: Vec<Vec<Number>> = pooled.to_vec2()?;
        for vector in &mut vectors {
            normalize_vector(vector);
        }
        Ok(vectors)
    }
}

impl EmbeddingProvider for CandleEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "Embedding batch");

        let mut vectors = Vec::with_capacity(texts.len());
        for slice in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_slice(slice)?);
        }

        debug!(count = vectors.len(), dim = self.dimension, "Batch complete");
        Ok(vectors)
    }
}

/// Caps encodings at `max_length` tokens, `[CLS]` and `[SEP]` included.
fn truncate_to(tokenizer: &mut Tokenizer, max_length: usize) -> Result<(), EmbeddingError> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
    Ok(())
}

/// Reads `hidden_size` from a BERT `config.json`.
fn hidden_size(config_json: &str) -> Result<usize, EmbeddingError> {
    let value: serde_json::Value = serde_json::from_str(config_json)
        .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;
    value
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| EmbeddingError::ModelNotFound("config has no hidden_size".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MODEL;
    use tempfile::TempDir;

    fn default_config() -> EmbedderConfig {
        EmbedderConfig {
            model_id: DEFAULT_MODEL.to_string(),
            cache_dir: None,
        }
    }

    #[test]
    fn test_hidden_size() {
        assert_eq!(hidden_size(r#"{"hidden_size": 384}"#).unwrap(), 384);
        assert!(hidden_size(r#"{"vocab_size": 10}"#).is_err());
        assert!(hidden_size("not json").is_err());
    }

    const WORD_LEVEL_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {"type": "BertProcessing", "sep": ["[SEP]", 3], "cls": ["[CLS]", 2]},
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"[UNK]": 0, "[PAD]": 1, "[CLS]": 2, "[SEP]": 3, "page": 4},
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_truncation_keeps_special_tokens() {
        let mut tokenizer: Tokenizer = WORD_LEVEL_TOKENIZER.parse().unwrap();
        truncate_to(&mut tokenizer, 5).unwrap();

        let long = tokenizer.encode("page page page page page page page", true).unwrap();
        assert_eq!(long.get_ids(), &[2, 4, 4, 4, 3]);

        let short = tokenizer.encode("page", true).unwrap();
        assert_eq!(short.get_ids(), &[2, 4, 3]);
    }

    #[test]
    fn test_incomplete_local_model_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.json"), "{}").unwrap();
        let config = EmbedderConfig {
            model_id: temp.path().to_string_lossy().into_owned(),
            cache_dir: None,
        };
        let err = resolve_model(&config).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::ModelNotFound(msg) if msg.contains("tokenizer.json")
        ));
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_load_model() {
        let embedder = CandleEmbedder::load(&default_config()).unwrap();
        assert_eq!(embedder.dimension(), 384);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_batch_is_normalized() {
        let embedder = CandleEmbedder::load(&default_config()).unwrap();
        let vectors = embedder.embed(&["Hello", "World", "Test"]).unwrap();
        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            assert_eq!(v.len(), 384);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_similar_texts_are_closer() {
        use crate::vector_ops::squared_l2_simd;

        let embedder = CandleEmbedder::load(&default_config()).unwrap();
        let v = embedder
            .embed(&[
                "The cat sat on the mat",
                "A cat is sitting on a mat",
                "Python programming language",
            ])
            .unwrap();
        assert!(squared_l2_simd(&v[0], &v[1]) < squared_l2_simd(&v[0], &v[2]));
    }
}
