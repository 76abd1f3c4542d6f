//! `loominal project` commands.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::store::ChunkStore;

/// Create a project and print its id.
pub async fn run_project_create(config: &Config, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Project name must not be empty");
    }

    let store = db::open_store(config).await?;
    let id = store.create_project(name).await?;
    println!("Created project {} ({})", id, name);
    Ok(())
}

/// Print every project with its chunk count.
pub async fn run_project_list(config: &Config) -> Result<()> {
    let store = db::open_store(config).await?;
    let projects = store.list_projects().await?;

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!("{:<6} {:<32} {:>8}  CREATED", "ID", "NAME", "CHUNKS");
    for p in projects {
        let chunks = store.count_chunks(p.id).await?;
        println!("{:<6} {:<32} {:>8}  {}", p.id, p.name, chunks, p.created_at);
    }
    Ok(())
}
