//! In-memory [`ChunkStore`] implementation for tests and library use.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over the project's chunks in insertion order.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Result, RetrievalError};
use crate::models::{format_ts_iso, NewChunk, Project, ScoredChunk, StoredChunk};
use crate::search::rank_top_k;

use super::ChunkStore;

struct StoredProject {
    id: i64,
    name: String,
    created_at: i64,
}

/// In-memory store. Ids start at 1 and increase monotonically.
pub struct InMemoryStore {
    projects: RwLock<Vec<StoredProject>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Register a project under a fixed id (ids of later projects continue
    /// after the largest id seen).
    pub fn with_project(self, id: i64, name: &str) -> Self {
        if let Ok(mut projects) = self.projects.write() {
            projects.push(StoredProject {
                id,
                name: name.to_string(),
                created_at: Utc::now().timestamp(),
            });
        }
        self
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> RetrievalError {
    RetrievalError::internal("in-memory store lock poisoned")
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn create_project(&self, name: &str) -> Result<i64> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        let id = projects.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        projects.push(StoredProject {
            id,
            name: name.to_string(),
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects = self.projects.read().map_err(poisoned)?;
        let mut out: Vec<Project> = projects
            .iter()
            .map(|p| Project {
                id: p.id,
                name: p.name.clone(),
                created_at: format_ts_iso(p.created_at),
            })
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn project_exists(&self, project_id: i64) -> Result<bool> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects.iter().any(|p| p.id == project_id))
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        if !self.project_exists(chunk.project_id).await? {
            return Err(RetrievalError::project_not_found(chunk.project_id));
        }
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        let id = chunks.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        chunks.push(StoredChunk {
            id,
            project_id: chunk.project_id,
            source_type: chunk.source_type.clone(),
            source_id: chunk.source_id.clone(),
            chunk_text: chunk.chunk_text.clone(),
            embedding: chunk.embedding.clone(),
            metadata: chunk.metadata.clone(),
            created_at: Utc::now().timestamp(),
        });
        Ok(id)
    }

    async fn count_chunks(&self, project_id: i64) -> Result<i64> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(chunks.iter().filter(|c| c.project_id == project_id).count() as i64)
    }

    async fn query_similar(
        &self,
        project_id: i64,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if !self.project_exists(project_id).await? {
            return Err(RetrievalError::project_not_found(project_id));
        }
        let candidates: Vec<StoredChunk> = {
            let chunks = self.chunks.read().map_err(poisoned)?;
            chunks
                .iter()
                .filter(|c| c.project_id == project_id)
                .cloned()
                .collect()
        };
        rank_top_k(query_vec, candidates, top_k)
    }
}
