//! Embedding generation with a lazily loaded, process-wide model.
//!
//! The [`EmbeddingGenerator`] owns a single model handle behind a
//! [`tokio::sync::OnceCell`]. The first caller triggers the load; concurrent
//! first callers wait on the same initialization. The outcome is cached
//! either way: a model that failed to load keeps failing with
//! [`RetrievalError::Extraction`] instead of being reloaded on every request.
//!
//! The blocking load itself runs through a [`std::sync::OnceLock`] shared
//! with the blocking pool. A caller that is cancelled mid-load resets the
//! `OnceCell`, but the load it started keeps running and the next caller
//! waits for that result, so the loader runs at most once per generator.
//!
//! # Seams
//!
//! - [`ModelLoader`] builds an [`EmbeddingModel`] (blocking, may download).
//! - [`EmbeddingModel`] runs inference on a batch of texts (blocking).
//! - [`Embedder`] is what request handlers and ingestion depend on.
//!
//! The default loader is [`FastEmbedLoader`], which runs ONNX models locally
//! via fastembed. The supported models mean-pool token outputs; the
//! generator L2-normalizes every vector so cosine similarity reduces to a
//! dot product.
//!
//! Also provides the BLOB codec used by the SQLite store:
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode a BLOB back into a `Vec<f32>`

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::{Result, RetrievalError};
use crate::models::EmbeddingVector;

/// Text-to-vector interface used by the request handlers and ingestion.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// True when the backing model is ready to serve without a load.
    fn is_loaded(&self) -> bool {
        true
    }
    /// Embed a single text.
    async fn generate(&self, text: &str) -> Result<EmbeddingVector>;
    /// Embed a batch of texts, returning vectors in input order.
    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
}

/// A loaded model that turns texts into raw (pooled) vectors.
///
/// Called from the blocking thread pool.
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Builds an [`EmbeddingModel`]. Called at most once per generator, from
/// the blocking thread pool.
pub trait ModelLoader: Send + Sync + 'static {
    fn model_name(&self) -> &str;
    fn load(&self) -> anyhow::Result<Box<dyn EmbeddingModel>>;
}

type LoadOutcome = std::result::Result<Arc<dyn EmbeddingModel>, String>;
type LoadSlot = Arc<OnceLock<LoadOutcome>>;

/// [`Embedder`] backed by a lazily loaded model.
pub struct EmbeddingGenerator {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<LoadOutcome>,
    loaded: LoadSlot,
    model_name: String,
    dims: usize,
    batch_size: usize,
    load_timeout: Duration,
}

impl EmbeddingGenerator {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        dims: usize,
        batch_size: usize,
        load_timeout: Duration,
    ) -> Self {
        let model_name = loader.model_name().to_string();
        Self {
            loader,
            model: OnceCell::new(),
            loaded: Arc::new(OnceLock::new()),
            model_name,
            dims,
            batch_size: batch_size.max(1),
            load_timeout,
        }
    }

    async fn model(&self) -> Result<Arc<dyn EmbeddingModel>> {
        match self.model.get_or_init(|| self.load_model()).await {
            Ok(model) => Ok(Arc::clone(model)),
            Err(message) => Err(RetrievalError::extraction(message.clone())),
        }
    }

    async fn load_model(&self) -> LoadOutcome {
        let loader = Arc::clone(&self.loader);
        let slot = Arc::clone(&self.loaded);
        let started = Instant::now();
        info!(model = %self.model_name, "loading embedding model");

        // Outlives this future: a later caller blocks on the same slot.
        let task = tokio::task::spawn_blocking(move || {
            slot.get_or_init(|| match loader.load() {
                Ok(model) => Ok(Arc::<dyn EmbeddingModel>::from(model)),
                Err(e) => Err(format!("{:#}", e)),
            })
            .clone()
        });
        let outcome: LoadOutcome = match tokio::time::timeout(self.load_timeout, task).await {
            Ok(Ok(Ok(model))) => Ok(model),
            Ok(Ok(Err(e))) => Err(format!("failed to load model '{}': {}", self.model_name, e)),
            Ok(Err(e)) => Err(format!("model loader for '{}' aborted: {}", self.model_name, e)),
            Err(_) => Err(format!(
                "loading model '{}' timed out after {}s",
                self.model_name,
                self.load_timeout.as_secs_f64()
            )),
        };

        match &outcome {
            Ok(_) => info!(
                model = %self.model_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "embedding model ready"
            ),
            Err(message) => warn!(model = %self.model_name, "{}", message),
        }
        outcome
    }

    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<EmbeddingVector>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(RetrievalError::extraction("input text must not be empty"));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let expected = texts.len();
        let batch_size = self.batch_size;
        let raw = tokio::task::spawn_blocking(move || model.embed(&texts, batch_size))
            .await
            .map_err(|e| RetrievalError::extraction(format!("inference aborted: {}", e)))?
            .map_err(|e| RetrievalError::extraction(format!("inference failed: {:#}", e)))?;

        if raw.len() != expected {
            return Err(RetrievalError::extraction(format!(
                "model returned {} vectors for {} inputs",
                raw.len(),
                expected
            )));
        }

        raw.into_iter()
            .map(|v| {
                if v.len() != self.dims {
                    return Err(RetrievalError::extraction(format!(
                        "model '{}' produced {} dims, expected {}",
                        self.model_name,
                        v.len(),
                        self.dims
                    )));
                }
                Ok(EmbeddingVector::new(normalize_l2(v)))
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for EmbeddingGenerator {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn is_loaded(&self) -> bool {
        matches!(self.model.get(), Some(Ok(_)))
    }

    async fn generate(&self, text: &str) -> Result<EmbeddingVector> {
        debug!(chars = text.len(), "generating query embedding");
        self.embed_all(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::extraction("empty embedding response"))
    }

    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.embed_all(texts.to_vec()).await
    }
}

// ============ fastembed ============

/// Loads a fastembed text-embedding model. The model is downloaded from
/// Hugging Face on first use and cached; afterwards inference is offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct FastEmbedLoader {
    model_name: String,
    show_download_progress: bool,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl FastEmbedLoader {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model_name: config.model.clone(),
            show_download_progress: config.show_download_progress,
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
impl ModelLoader for FastEmbedLoader {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn load(&self) -> anyhow::Result<Box<dyn EmbeddingModel>> {
        let model = config_to_fastembed_model(&self.model_name)?;
        let embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model)
                .with_show_download_progress(self.show_download_progress),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Box::new(FastEmbedModel {
            inner: std::sync::Mutex::new(embedding),
        }))
    }
}

/// Inference needs exclusive access to the ONNX session.
#[cfg(feature = "local-embeddings-fastembed")]
struct FastEmbedModel {
    inner: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl EmbeddingModel for FastEmbedModel {
    fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut model = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
        model
            .embed(texts.to_vec(), Some(batch_size))
            .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => anyhow::bail!("Unknown local embedding model: '{}'", other),
    }
}

/// Create the generator for the configured model.
///
/// Nothing is loaded here; the model is loaded on the first embedding call.
pub fn create_generator(config: &EmbeddingConfig) -> anyhow::Result<EmbeddingGenerator> {
    let dims = config.model_dims()?;
    let loader = default_loader(config)?;
    Ok(EmbeddingGenerator::new(
        loader,
        dims,
        config.batch_size,
        Duration::from_secs(config.load_timeout_secs),
    ))
}

#[cfg(feature = "local-embeddings-fastembed")]
fn default_loader(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    Ok(Arc::new(FastEmbedLoader::new(config)))
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
fn default_loader(_config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn ModelLoader>> {
    anyhow::bail!("Local embeddings require --features local-embeddings-fastembed")
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
