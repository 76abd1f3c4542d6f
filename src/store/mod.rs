//! Storage abstraction for projects and embedded chunks.
//!
//! The [`ChunkStore`] trait is the storage side of the query path;
//! [`query_similar`](ChunkStore::query_similar) does the project-scoped
//! top-K ranking. Backends:
//!
//! - [`SqliteStore`]: sqlx SQLite pool, vectors stored as f32 BLOBs.
//! - [`InMemoryStore`]: `RwLock<Vec<_>>`, for tests and embedding the library.
//!
//! Both rank with [`rank_top_k`](crate::search::rank_top_k), so ordering and
//! tie-breaking are identical across backends.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{NewChunk, Project, ScoredChunk};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend for projects and their chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_project`](ChunkStore::create_project) | Register a project |
/// | [`list_projects`](ChunkStore::list_projects) | List projects by id |
/// | [`project_exists`](ChunkStore::project_exists) | Existence check |
/// | [`insert_chunk`](ChunkStore::insert_chunk) | Persist an embedded chunk |
/// | [`count_chunks`](ChunkStore::count_chunks) | Chunks stored for a project |
/// | [`query_similar`](ChunkStore::query_similar) | Project-scoped top-K search |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Create a project and return its id.
    async fn create_project(&self, name: &str) -> Result<i64>;

    /// All projects, ordered by id.
    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn project_exists(&self, project_id: i64) -> Result<bool>;

    /// Insert a chunk and return its id. Fails with `NotFound` when the
    /// owning project does not exist.
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<i64>;

    async fn count_chunks(&self, project_id: i64) -> Result<i64>;

    /// Return the `top_k` chunks of `project_id` most similar to
    /// `query_vec`, by descending score with ties in insertion order.
    ///
    /// Fails with `NotFound` for an unknown project and `Internal` when a
    /// stored vector's dimensionality differs from the query's.
    async fn query_similar(
        &self,
        project_id: i64,
        query_vec: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}
