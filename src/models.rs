//! Core data models for the retrieval path.
//!
//! Chunks are written by ingestion and only read by the query path. Query
//! results are transient and live for one request/response cycle.

use serde::Serialize;

/// A fixed-length, L2-normalized embedding produced by the generator.
///
/// Immutable once created; the generator is the only producer outside tests.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// A project that owns chunks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// A chunk about to be inserted.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub project_id: i64,
    pub source_type: String,
    pub source_id: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A persisted unit of project knowledge.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    pub project_id: i64,
    pub source_type: String,
    pub source_id: String,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A stored chunk with its similarity to a query vector, as returned by a
/// [`ChunkStore`](crate::store::ChunkStore).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

/// A search hit returned to callers: chunk fields, score, and the query
/// that produced it. The raw vector is not serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub id: i64,
    pub project_id: i64,
    pub source_type: String,
    pub source_id: String,
    pub chunk_text: String,
    pub metadata: serde_json::Value,
    pub created_at: String,
    /// Cosine similarity in `[-1.0, 1.0]`, higher is more similar.
    pub score: f32,
    pub query: String,
}

impl SimilarityResult {
    pub fn from_scored(scored: ScoredChunk, query: &str) -> Self {
        let chunk = scored.chunk;
        Self {
            id: chunk.id,
            project_id: chunk.project_id,
            source_type: chunk.source_type,
            source_id: chunk.source_id,
            chunk_text: chunk.chunk_text,
            metadata: chunk.metadata,
            created_at: format_ts_iso(chunk.created_at),
            score: scored.score,
            query: query.to_string(),
        }
    }
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
