//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Vectors are stored as little-endian f32 BLOBs next to their chunk text.
//! Similarity is computed in Rust over the project's rows, read in id order
//! so ties resolve to insertion order.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Result, RetrievalError};
use crate::models::{format_ts_iso, NewChunk, Project, ScoredChunk, StoredChunk};
use crate::search::rank_top_k;

use super::ChunkStore;

/// SQLite implementation of the [`ChunkStore`] trait.
///
/// Wraps a [`SqlitePool`]; the schema is created by
/// [`run_migrations`](crate::migrate::run_migrations).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn create_project(&self, name: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO projects (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM projects ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Project {
                id: row.get("id"),
                name: row.get("name"),
                created_at: format_ts_iso(row.get("created_at")),
            })
            .collect())
    }

    async fn project_exists(&self, project_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64> {
        if !self.project_exists(chunk.project_id).await? {
            return Err(RetrievalError::project_not_found(chunk.project_id));
        }
        let metadata_json = serde_json::to_string(&chunk.metadata)
            .map_err(|e| RetrievalError::internal(format!("invalid chunk metadata: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO chunks (project_id, source_type, source_id, chunk_text,
                                embedding, dims, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.project_id)
        .bind(&chunk.source_type)
        .bind(&chunk.source_id)
        .bind(&chunk.chunk_text)
        .bind(vec_to_blob(&chunk.embedding))
        .bind(chunk.embedding.len() as i64)
        .bind(metadata_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn count_chunks(&self, project_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
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

        let rows = sqlx::query(
            r#"
            SELECT id, project_id, source_type, source_id, chunk_text,
                   embedding, dims, metadata_json, created_at
            FROM chunks
            WHERE project_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                Ok(StoredChunk {
                    id,
                    project_id: row.get("project_id"),
                    source_type: row.get("source_type"),
                    source_id: row.get("source_id"),
                    chunk_text: row.get("chunk_text"),
                    embedding: decode_embedding(id, &blob, row.get("dims"))?,
                    metadata: serde_json::from_str(&metadata_json).map_err(|e| {
                        RetrievalError::internal(format!(
                            "chunk {} has invalid metadata: {}",
                            id, e
                        ))
                    })?,
                    created_at: row.get("created_at"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        rank_top_k(query_vec, candidates, top_k)
    }
}

/// Decode a stored vector, rejecting blobs that do not hold exactly `dims`
/// f32 values.
fn decode_embedding(chunk_id: i64, blob: &[u8], dims: i64) -> Result<Vec<f32>> {
    let expected = usize::try_from(dims).ok().map(|d| d * 4);
    if blob.len() % 4 != 0 || expected != Some(blob.len()) {
        return Err(RetrievalError::internal(format!(
            "chunk {} has a corrupt embedding: {} bytes for {} dims",
            chunk_id,
            blob.len(),
            dims
        )));
    }
    Ok(blob_to_vec(blob))
}
