//! Project-scoped similarity search.
//!
//! Two layers:
//!
//! - [`rank_top_k`] scores candidate chunks against a query vector and keeps
//!   the best `top_k`. Every [`ChunkStore`] backend ranks through it.
//! - [`query`] / [`retrieve`] are the service entry points used by the HTTP
//!   handlers and the CLI: embed the question, query the store, and attach
//!   the question to each result.
//!
//! # Ordering
//!
//! Results are sorted by descending cosine similarity. Candidates arrive in
//! insertion order and the sort is stable, so equal scores keep insertion
//! order and repeated identical queries return identical lists.

use anyhow::Result as AnyResult;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_generator, Embedder};
use crate::error::{Result, RetrievalError};
use crate::models::{EmbeddingVector, ScoredChunk, SimilarityResult, StoredChunk};
use crate::store::ChunkStore;

/// Cosine similarity between two vectors of equal length.
///
/// Returns `0.0` when either vector has zero magnitude. Vectors of different
/// lengths are an error: they come from different models and cannot be
/// compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RetrievalError::internal(format!(
            "embedding dimensionality mismatch: query has {} dims, stored vector has {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return Ok(0.0);
    }
    Ok(dot / denom)
}

/// Score `candidates` against `query_vec` and return the best `top_k`.
///
/// `candidates` must be in insertion order; that order breaks ties.
pub fn rank_top_k(
    query_vec: &[f32],
    candidates: Vec<StoredChunk>,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    let mut scored = candidates
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(query_vec, &chunk.embedding)?;
            Ok(ScoredChunk { chunk, score })
        })
        .collect::<Result<Vec<_>>>()?;

    // sort_by is stable
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    Ok(scored)
}

/// Similarity query service: top-`top_k` chunks of `project_id` for an
/// already computed query vector.
pub async fn query(
    store: &dyn ChunkStore,
    project_id: i64,
    query_vec: &EmbeddingVector,
    top_k: usize,
    question: &str,
) -> Result<Vec<SimilarityResult>> {
    if top_k == 0 {
        return Err(RetrievalError::validation("topK must be a positive integer"));
    }

    let hits = store
        .query_similar(project_id, query_vec.as_slice(), top_k)
        .await?;

    Ok(hits
        .into_iter()
        .map(|hit| SimilarityResult::from_scored(hit, question))
        .collect())
}

/// Embed `question` and run [`query`] with the resulting vector.
pub async fn retrieve(
    embedder: &dyn Embedder,
    store: &dyn ChunkStore,
    project_id: i64,
    question: &str,
    top_k: usize,
) -> Result<Vec<SimilarityResult>> {
    let vector = embedder.generate(question).await?;
    tracing::debug!(project_id, top_k, dims = vector.dims(), "querying similar chunks");
    query(store, project_id, &vector, top_k, question).await
}

/// CLI entry point for `loominal query`.
pub async fn run_query(
    config: &Config,
    project_id: i64,
    question: &str,
    top_k: Option<usize>,
) -> AnyResult<()> {
    let top_k = top_k
        .unwrap_or(config.retrieval.default_top_k)
        .min(config.retrieval.max_top_k);
    let store = db::open_store(config).await?;
    let generator = create_generator(&config.embedding)?;

    let results = retrieve(&generator, &store, project_id, question, top_k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}:{} (chunk {})",
            i + 1,
            r.score,
            r.source_type,
            r.source_id,
            r.id
        );
        let preview: String = r.chunk_text.chars().take(200).collect();
        for line in preview.lines() {
            println!("    {}", line);
        }
        println!();
    }

    Ok(())
}
