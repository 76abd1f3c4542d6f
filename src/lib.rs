//! # Loominal Retrieval
//!
//! The semantic-search retrieval path of Loominal: turn a natural-language
//! question into an embedding, rank a project's stored chunks by cosine
//! similarity, and return the top matches over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Ingest    │──▶│  Embedding   │──▶│  ChunkStore  │
//! │ files→chunks│   │  generator   │   │ SQLite / mem │
//! └─────────────┘   └──────┬───────┘   └──────┬───────┘
//!                          │                  │
//!                          ▼                  ▼
//!                   ┌────────────────────────────┐
//!                   │  search::retrieve (top-K)  │
//!                   └─────────────┬──────────────┘
//!                                 │
//!                      ┌──────────┴──────────┐
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │(loominal)│         │  (axum)  │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! loominal init
//! loominal project create "payments"
//! loominal ingest 1 ./docs
//! loominal query 1 "how do we deploy?" --top-k 3
//! loominal serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Retrieval error type and HTTP status classes |
//! | [`models`] | Core data types |
//! | [`embedding`] | Lazily loaded embedding generator |
//! | [`store`] | Chunk storage trait and backends |
//! | [`search`] | Cosine ranking and the similarity query service |
//! | [`grounding`] | Chat context filtering and source diversity |
//! | [`chunk`] | Line-window chunking |
//! | [`ingest`] | Directory ingestion pipeline |
//! | [`project`] | Project CLI commands |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod grounding;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod project;
pub mod search;
pub mod server;
pub mod store;
