//! Text encoders.
//!
//! - `Encoder`: the capability the pipeline depends on (text in, vector out)
//! - `EmbeddingModel`: fastembed-backed encoder with a local model cache
//! - `embed_all`: batched, order-preserving encoding over a rayon pool

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use fastembed::{InitOptions, TextEmbedding};
use indicatif::ProgressBar;
use rayon::prelude::*;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Invalid batch size: {0}")]
    InvalidBatchSize(usize),

    #[error("Encoder returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("Encoder returned a {got}-dim vector, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Maps text to fixed-length vectors, deterministically for a fixed model.
///
/// Passed explicitly into whatever needs it; there is no global model.
pub trait Encoder: Send + Sync {
    /// Model name, stamped into every vector file this encoder produces.
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// Encode texts in order, one vector per text.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Encode a single text.
    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })
    }

    /// SHA256 of the model name, used to tie vector files to their encoder.
    fn model_id_hash(&self) -> [u8; 32] {
        model_id_hash(self.name())
    }
}

pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model will be downloaded on first use if not cached.
    /// Models are cached in `models_dir`.
    pub fn new(model_name: &str, models_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = Self::parse_model_name(model_name)?;

        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading embedding model '{}'", model_name);

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let started = Instant::now();
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        log::debug!("model ready in {:.4} sec", started.elapsed().as_secs_f64());

        // Get model dimensions by embedding a test string
        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match name.to_lowercase().as_str() {
            "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "all-minilm-l6-v2-q" | "allminiml6v2q" => {
                Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q)
            }
            "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-small-en-v1.5-q" | "bgesmallenv15q" => {
                Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
            }
            "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-base-en-v1.5-q" | "bgebaseenv15q" => {
                Ok(fastembed::EmbeddingModel::BGEBaseENV15Q)
            }
            _ => Err(EmbeddingError::InvalidModel(format!(
                "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5 (add -q suffix for quantized)",
                name
            ))),
        }
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Encoder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

/// Encode `texts` in batches of `batch_size`, optionally on `parallelism`
/// worker threads, and return vectors in input order.
///
/// Each batch's output lands at the batch's own offset, so batch size and
/// thread count never change the result.
pub fn embed_all(
    encoder: &dyn Encoder,
    texts: &[String],
    batch_size: usize,
    parallelism: Option<usize>,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if batch_size == 0 {
        return Err(EmbeddingError::InvalidBatchSize(batch_size));
    }
    if texts.is_empty() {
        return Ok(vec![]);
    }

    let started = Instant::now();
    let encode_batch = |batch: &[String]| -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = encoder.encode(batch)?;
        check_batch(encoder.dimensions(), batch.len(), &vectors)?;
        if let Some(pb) = progress {
            pb.inc(batch.len() as u64);
        }
        Ok(vectors)
    };

    let run = || -> Result<Vec<Vec<Vec<f32>>>, EmbeddingError> {
        texts.par_chunks(batch_size).map(encode_batch).collect()
    };

    let batches = match parallelism {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| EmbeddingError::EmbeddingFailed(format!("thread pool: {e}")))?
            .install(run)?,
        None => run()?,
    };

    let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();

    let elapsed = started.elapsed().as_secs_f64();
    log::info!("Time taken for embeddings = {:.2}", elapsed);
    if elapsed > 0.0 {
        log::info!("Throughput: {:.2} verses/sec", texts.len() as f64 / elapsed);
    }

    Ok(vectors)
}

fn check_batch(dimensions: usize, expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            got: bad.len(),
        });
    }
    Ok(())
}
