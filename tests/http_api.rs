//! End-to-end tests for the HTTP retrieval endpoints.
//!
//! Each test runs the real server on a free port against a SQLite database
//! in a temp directory. The embedder is a lookup table so scores are exact,
//! and it counts calls so tests can assert that invalid requests never
//! reach it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use loominal_retrieval::config::{self, Config};
use loominal_retrieval::embedding::Embedder;
use loominal_retrieval::error::{Result, RetrievalError};
use loominal_retrieval::migrate;
use loominal_retrieval::models::{EmbeddingVector, NewChunk};
use loominal_retrieval::server;
use loominal_retrieval::store::{ChunkStore, SqliteStore};

// ─── Fake embedder ──────────────────────────────────────────────────

/// Maps known questions to fixed vectors; everything else embeds to `[1, 0]`.
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    fail: bool,
}

impl TableEmbedder {
    fn new() -> Self {
        Self {
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn model_name(&self) -> &str {
        "table"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn generate(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RetrievalError::extraction("model unavailable"));
        }
        let v = self.table.get(text).cloned().unwrap_or_else(|| vec![1.0, 0.0]);
        Ok(EmbeddingVector::new(v))
    }

    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.generate(t).await?);
        }
        Ok(out)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let path = tmp.path().join("loominal.toml");
    std::fs::write(
        &path,
        format!(
            r#"[db]
path = "{}/data/loominal.sqlite"

[server]
bind = "127.0.0.1:{}"
"#,
            tmp.path().display(),
            port
        ),
    )
    .unwrap();
    config::load_config(&path).unwrap()
}

/// Unit vector whose cosine with `[1, 0]` is `score`.
fn at_score(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).sqrt()]
}

async fn insert_project(store: &SqliteStore, id: i64, name: &str) {
    sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, 0)")
        .bind(id)
        .bind(name)
        .execute(store.pool())
        .await
        .unwrap();
}

async fn insert_chunk(
    store: &SqliteStore,
    project_id: i64,
    source_type: &str,
    source_id: &str,
    text: &str,
    embedding: Vec<f32>,
) -> i64 {
    store
        .insert_chunk(&NewChunk {
            project_id,
            source_type: source_type.to_string(),
            source_id: source_id.to_string(),
            chunk_text: text.to_string(),
            embedding,
            metadata: json!({ "seed": source_id }),
        })
        .await
        .unwrap()
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post_raw(&self, path: &str, body: &'static str) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

async fn wait_for_server(base: &str) {
    let client = reqwest::Client::new();
    let url = format!("{}/health", base);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Migrate a fresh database, let `seed` fill it, and start the server.
async fn start_server<F, Fut>(embedder: Arc<TableEmbedder>, seed: F) -> TestServer
where
    F: FnOnce(SqliteStore) -> Fut,
    Fut: std::future::Future<Output = SqliteStore>,
{
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = test_config(&tmp, port);

    migrate::run_migrations(&cfg).await.unwrap();
    let store = seed(loominal_retrieval::db::open_store(&cfg).await.unwrap()).await;

    let store: Arc<dyn ChunkStore> = Arc::new(store);
    let embedder: Arc<dyn Embedder> = embedder;
    tokio::spawn(async move {
        server::run_server_with(&cfg, embedder, store).await.unwrap();
    });

    let base = format!("http://127.0.0.1:{}", port);
    wait_for_server(&base).await;

    TestServer {
        _tmp: tmp,
        base,
        client: reqwest::Client::new(),
    }
}

/// Project 42 with A (0.9), B (0.7), C (0.95) inserted in that order, and
/// project 43 with a perfect match that must never leak into 42.
async fn seed_two_projects(store: SqliteStore) -> SqliteStore {
    insert_project(&store, 42, "payments").await;
    insert_project(&store, 43, "billing").await;
    insert_chunk(&store, 42, "github", "A", "chunk A text", at_score(0.9)).await;
    insert_chunk(&store, 42, "github", "B", "chunk B text", at_score(0.7)).await;
    insert_chunk(&store, 42, "notion", "C", "chunk C text", at_score(0.95)).await;
    insert_chunk(&store, 43, "github", "X", "other project", vec![1.0, 0.0]).await;
    store
}

fn source_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["sourceId"].as_str().unwrap().to_string())
        .collect()
}

// ─── POST /embeddings/query ─────────────────────────────────────────

#[tokio::test]
async fn test_query_returns_top_k_in_score_order() {
    let embedder = Arc::new(TableEmbedder::new());
    let srv = start_server(embedder.clone(), seed_two_projects).await;

    let (status, body) = srv
        .post(
            "/embeddings/query",
            json!({ "projectId": 42, "question": "how do we deploy?", "topK": 2 }),
        )
        .await;

    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(source_ids(&body), vec!["C", "A"]);

    let first = &body["results"][0];
    assert!((first["score"].as_f64().unwrap() - 0.95).abs() < 1e-4);
    assert_eq!(first["projectId"], 42);
    assert_eq!(first["sourceType"], "notion");
    assert_eq!(first["chunkText"], "chunk C text");
    assert_eq!(first["query"], "how do we deploy?");
    assert_eq!(first["metadata"]["seed"], "C");
    assert!(first["createdAt"].is_string());
    assert!(first.get("embedding").is_none());
    assert!((body["results"][1]["score"].as_f64().unwrap() - 0.9).abs() < 1e-4);
    assert_eq!(embedder.calls(), 1);
}

#[tokio::test]
async fn test_query_is_scoped_to_project() {
    let srv = start_server(Arc::new(TableEmbedder::new()), seed_two_projects).await;

    let (status, body) = srv
        .post("/embeddings/query", json!({ "projectId": 42, "question": "anything", "topK": 10 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(source_ids(&body), vec!["C", "A", "B"]);
    for r in body["results"].as_array().unwrap() {
        assert_eq!(r["projectId"], 42);
    }
}

#[tokio::test]
async fn test_query_default_top_k_is_five() {
    let srv = start_server(Arc::new(TableEmbedder::new()), |store| async move {
        insert_project(&store, 1, "many").await;
        for i in 0..8 {
            let id = format!("c{}", i);
            insert_chunk(&store, 1, "file", &id, "some chunk text", at_score(0.5)).await;
        }
        store
    })
    .await;

    let (status, body) = srv
        .post("/embeddings/query", json!({ "projectId": 1, "question": "q" }))
        .await;
    assert_eq!(status, 200);
    // equal scores resolve to insertion order
    assert_eq!(source_ids(&body), vec!["c0", "c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn test_query_project_without_chunks_returns_empty() {
    let srv = start_server(Arc::new(TableEmbedder::new()), |store| async move {
        insert_project(&store, 7, "empty").await;
        store
    })
    .await;

    let (status, body) = srv
        .post("/embeddings/query", json!({ "projectId": 7, "question": "q", "topK": 3 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "results": [] }));
}

#[tokio::test]
async fn test_query_is_deterministic() {
    let srv = start_server(Arc::new(TableEmbedder::new()), seed_two_projects).await;
    let req = json!({ "projectId": 42, "question": "same question", "topK": 3 });

    let (_, first) = srv.post("/embeddings/query", req.clone()).await;
    let (_, second) = srv.post("/embeddings/query", req).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_fields_rejected_before_embedding() {
    let embedder = Arc::new(TableEmbedder::new());
    let srv = start_server(embedder.clone(), seed_two_projects).await;

    for body in [
        json!({ "question": "q" }),
        json!({ "projectId": 42 }),
        json!({ "projectId": 42, "question": "" }),
        json!({ "projectId": 0, "question": "q" }),
        json!({}),
    ] {
        let (status, resp) = srv.post("/embeddings/query", body.clone()).await;
        assert_eq!(status, 400, "request: {}", body);
        assert_eq!(resp, json!({ "error": "Missing projectId or question" }));
    }
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_and_bad_top_k_are_400() {
    let embedder = Arc::new(TableEmbedder::new());
    let srv = start_server(embedder.clone(), seed_two_projects).await;

    let (status, resp) = srv.post_raw("/embeddings/query", "{not json").await;
    assert_eq!(status, 400);
    assert!(resp["error"].as_str().unwrap().starts_with("Invalid JSON body"));

    let (status, resp) = srv
        .post("/embeddings/query", json!({ "projectId": 42, "question": "q", "topK": -1 }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "topK must be a positive integer");

    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_unknown_project_is_500() {
    let srv = start_server(Arc::new(TableEmbedder::new()), seed_two_projects).await;

    let (status, resp) = srv
        .post("/embeddings/query", json!({ "projectId": 999, "question": "q" }))
        .await;
    assert_eq!(status, 500);
    assert_eq!(resp["error"], "project not found: 999");
}

#[tokio::test]
async fn test_embedding_failure_is_500_with_message() {
    let embedder = Arc::new(TableEmbedder::failing());
    let srv = start_server(embedder.clone(), seed_two_projects).await;

    let (status, resp) = srv
        .post("/embeddings/query", json!({ "projectId": 42, "question": "q" }))
        .await;
    assert_eq!(status, 500);
    assert!(resp["error"].as_str().unwrap().contains("model unavailable"));
    assert!(resp.get("results").is_none());
    assert_eq!(embedder.calls(), 1);
}

// ─── POST /chat/context ─────────────────────────────────────────────

#[tokio::test]
async fn test_chat_context_filters_noise_and_spreads_sources() {
    let srv = start_server(Arc::new(TableEmbedder::new()), |store| async move {
        insert_project(&store, 5, "support").await;
        insert_chunk(&store, 5, "slack", "s1", "<@U1ABC> has joined the channel", at_score(0.99)).await;
        insert_chunk(&store, 5, "slack", "s2", "The deploy failed because the migration timed out", at_score(0.8)).await;
        for i in 0..6 {
            let id = format!("g{}", i);
            let score = 0.9 - i as f32 * 0.01;
            insert_chunk(&store, 5, "github", &id, "fn deploy() -> Result<()> { migrate()?; }", at_score(score)).await;
        }
        store
    })
    .await;

    let (status, body) = srv
        .post("/chat/context", json!({ "projectId": 5, "message": "why did the deploy fail?" }))
        .await;
    assert_eq!(status, 200, "body: {}", body);

    let ids = source_ids(&body);
    assert!(!ids.contains(&"s1".to_string()));
    assert!(ids.contains(&"s2".to_string()));
    assert_eq!(ids.len(), 7);

    let scores: Vec<f64> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let metadata = &body["metadata"];
    assert_eq!(metadata["chunksFound"], 7);
    assert_eq!(metadata["sourceTypesFound"], json!(["github", "slack"]));
    assert_eq!(metadata["sourceTypeDistribution"], json!({ "github": 6, "slack": 1 }));
}

#[tokio::test]
async fn test_chat_context_requires_message() {
    let embedder = Arc::new(TableEmbedder::new());
    let srv = start_server(embedder.clone(), seed_two_projects).await;

    let (status, resp) = srv.post("/chat/context", json!({ "projectId": 42 })).await;
    assert_eq!(status, 400);
    assert_eq!(resp["error"], "Missing projectId or message");
    assert_eq!(embedder.calls(), 0);
}

// ─── GET /health ────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_model() {
    let srv = start_server(Arc::new(TableEmbedder::new()), seed_two_projects).await;

    let body: Value = srv
        .client
        .get(format!("{}/health", srv.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model"], "table");
    assert_eq!(body["dims"], 2);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
