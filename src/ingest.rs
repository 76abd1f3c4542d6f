//! Ingestion pipeline: files → line chunks → embeddings → store.
//!
//! Walks a directory with include/exclude globs, chunks every text file,
//! embeds the chunks in batches with the same generator the query path
//! uses, and inserts them for a project. Files that are not valid UTF-8 are
//! skipped.

use anyhow::{bail, Result as AnyResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::chunk::{chunk_lines, LineChunk};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::embedding::{create_generator, Embedder};
use crate::error::{Result, RetrievalError};
use crate::models::NewChunk;
use crate::store::ChunkStore;

/// A text file read from disk, keyed by its path relative to the scan root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Counters reported after an ingest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub files: usize,
    pub chunks: usize,
}

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Collect text files under `root`, sorted by relative path.
pub fn scan_directory(root: &Path, config: &IngestConfig) -> AnyResult<Vec<SourceFile>> {
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => files.push(SourceFile {
                path: rel_str,
                content,
            }),
            Err(e) => debug!(path = %rel_str, error = %e, "skipping unreadable file"),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> AnyResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Chunk, embed, and store `files` for `project_id`.
pub async fn ingest_files(
    embedder: &dyn Embedder,
    store: &dyn ChunkStore,
    project_id: i64,
    files: &[SourceFile],
    source_type: &str,
    lines_per_chunk: usize,
    batch_size: usize,
) -> Result<IngestStats> {
    if !store.project_exists(project_id).await? {
        return Err(RetrievalError::project_not_found(project_id));
    }

    let mut pending: Vec<(String, LineChunk)> = Vec::new();
    let mut stats = IngestStats::default();
    for file in files {
        let chunks = chunk_lines(&file.path, &file.content, lines_per_chunk);
        if chunks.is_empty() {
            continue;
        }
        stats.files += 1;
        pending.extend(chunks.into_iter().map(|c| (file.path.clone(), c)));
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, c)| c.text.clone()).collect();
        let vectors = embedder.generate_batch(&texts).await?;

        for ((path, chunk), vector) in batch.iter().zip(vectors) {
            store
                .insert_chunk(&NewChunk {
                    project_id,
                    source_type: source_type.to_string(),
                    source_id: chunk.source_id.clone(),
                    chunk_text: chunk.text.clone(),
                    embedding: vector.into_inner(),
                    metadata: chunk.metadata(path),
                })
                .await?;
            stats.chunks += 1;
        }
        debug!(project_id, stored = stats.chunks, total = pending.len(), "ingest progress");
    }

    info!(project_id, files = stats.files, chunks = stats.chunks, "ingest complete");
    Ok(stats)
}

/// CLI entry point for `loominal ingest`.
pub async fn run_ingest(
    config: &Config,
    project_id: i64,
    root: &Path,
    source_type: Option<String>,
) -> AnyResult<()> {
    let files = scan_directory(root, &config.ingest)?;
    let source_type = source_type.unwrap_or_else(|| config.ingest.source_type.clone());
    let store = db::open_store(config).await?;
    let generator = create_generator(&config.embedding)?;

    let stats = ingest_files(
        &generator,
        &store,
        project_id,
        &files,
        &source_type,
        config.ingest.lines_per_chunk,
        config.embedding.batch_size,
    )
    .await?;

    println!("ingest {}", root.display());
    println!("  project: {}", project_id);
    println!("  files: {}", stats.files);
    println!("  chunks: {}", stats.chunks);
    println!("ok");

    Ok(())
}
