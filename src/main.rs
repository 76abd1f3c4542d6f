//! # Loominal CLI (`loominal`)
//!
//! Database setup, project management, ingestion, ad-hoc queries, and the
//! HTTP server for the Loominal retrieval path.
//!
//! ## Usage
//!
//! ```bash
//! loominal --config ./config/loominal.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `loominal init` | Create the SQLite database and run schema migrations |
//! | `loominal project create <name>` | Register a project |
//! | `loominal project list` | List projects with chunk counts |
//! | `loominal ingest <project> <path>` | Chunk, embed, and store a directory |
//! | `loominal query <project> "<question>"` | Print the top-K similar chunks |
//! | `loominal serve` | Start the HTTP server |
//!
//! Log verbosity follows `RUST_LOG` (default `loominal_retrieval=info`).
//! Logs go to stderr; command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use loominal_retrieval::{config, ingest, migrate, project, search, server};

/// Loominal retrieval CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/loominal.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "loominal",
    about = "Loominal retrieval: embed questions and find the most similar project chunks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/loominal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `projects` and `chunks`
    /// tables. Safe to run more than once.
    Init,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Ingest a directory into a project.
    ///
    /// Files matching `[ingest].include_globs` are split into line windows,
    /// embedded, and stored.
    Ingest {
        /// Target project id.
        project_id: i64,

        /// Directory to scan.
        path: PathBuf,

        /// Source type recorded on each chunk (defaults to `[ingest].source_type`).
        #[arg(long)]
        source_type: Option<String>,
    },

    /// Run a similarity query and print the results.
    Query {
        /// Project id to search.
        project_id: i64,

        /// Natural-language question.
        question: String,

        /// Number of results (defaults to `[retrieval].default_top_k`).
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        top_k: Option<u64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

/// Project subcommands.
#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project and print its id.
    Create {
        /// Display name.
        name: String,
    },
    /// List all projects.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("loominal_retrieval=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Project { action } => match action {
            ProjectAction::Create { name } => {
                project::run_project_create(&cfg, &name).await?;
            }
            ProjectAction::List => {
                project::run_project_list(&cfg).await?;
            }
        },
        Commands::Ingest {
            project_id,
            path,
            source_type,
        } => {
            ingest::run_ingest(&cfg, project_id, &path, source_type).await?;
        }
        Commands::Query {
            project_id,
            question,
            top_k,
        } => {
            search::run_query(&cfg, project_id, &question, top_k.map(|k| k as usize)).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
