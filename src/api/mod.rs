//! HTTP API for ingestion and question answering
//!
//! Routes:
//! - `POST /api/ingest` submits a crawl-and-index job, returns 202 with a job id
//! - `GET /api/ingest/{job_id}` reports job progress
//! - `POST /api/ask` answers a question from the indexed content
//! - `GET /api/metrics` returns usage counters and rolling averages
//! - `GET /api/health` reports liveness and dependency state
//!
//! Errors use a flat `{"detail": "..."}` body: 400 for invalid input,
//! 404 for unknown jobs, 500 for everything else.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::answer::{AnswerGenerator, AnswerResult};
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::ingest::{IngestParams, IngestionService};
use crate::jobs::{JobStatus, JobStore};
use crate::store::VectorStore;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    ingestion: Arc<IngestionService>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    answerer: Arc<AnswerGenerator>,
    jobs: JobStore,
    min_confidence: f32,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionService>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        answerer: Arc<AnswerGenerator>,
        jobs: JobStore,
        min_confidence: f32,
    ) -> Self {
        Self {
            ingestion,
            store,
            embedder,
            answerer,
            jobs,
            min_confidence,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    urls: Vec<String>,
    #[serde(default = "default_max_pages")]
    max_pages: u32,
    #[serde(default = "default_max_depth")]
    max_depth: u32,
    #[serde(default)]
    domain_allowlist: Option<Vec<String>>,
}

fn default_max_pages() -> u32 {
    50
}

fn default_max_depth() -> u32 {
    2
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Serialize)]
struct IngestAccepted {
    job_id: String,
    status: String,
    message: String,
    created_at: String,
}

#[derive(Debug, Serialize)]
struct JobStatusResponse {
    job_id: String,
    status: String,
    progress: f64,
    pages_processed: i32,
    total_pages: i32,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    min_confidence: Option<f32>,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    total_ingestions: u64,
    total_queries: u64,
    avg_ingest_time_seconds: f64,
    avg_query_time_ms: f64,
    total_pages_indexed: u64,
    index_size_mb: f64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
    services: ServiceHealth,
}

#[derive(Debug, Serialize)]
struct ServiceHealth {
    database: bool,
    vector_store: bool,
}

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = std::result::Result<T, ApiError>;

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: message.into(),
        }),
    )
}

fn api_error(err: Error) -> ApiError {
    let (status, detail) = match err {
        Error::Validation(message) => (StatusCode::BAD_REQUEST, message),
        Error::NotFound(message) => (StatusCode::NOT_FOUND, message),
        Error::Embedding(message) => (StatusCode::BAD_GATEWAY, message),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    };
    (status, Json(ErrorBody { detail }))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestAccepted>)> {
    if request.urls.is_empty() {
        return Err(bad_request("At least one URL is required"));
    }
    if !(1..=500).contains(&request.max_pages) {
        return Err(bad_request("max_pages must be between 1 and 500"));
    }
    if !(1..=5).contains(&request.max_depth) {
        return Err(bad_request("max_depth must be between 1 and 5"));
    }

    let job = state
        .ingestion
        .submit(IngestParams {
            urls: request.urls,
            max_pages: request.max_pages,
            max_depth: request.max_depth,
            domain_allowlist: request.domain_allowlist,
        })
        .await
        .map_err(api_error)?;

    info!(job_id = %job.job_id, "Accepted ingestion job");
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            job_id: job.job_id,
            status: job.status,
            message: "Ingestion started".to_string(),
            created_at: job.created_at,
        }),
    ))
}

async fn status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state.ingestion.get_status(&job_id).await.map_err(api_error)?;
    let progress = match job.get_status() {
        Ok(JobStatus::Completed) => 1.0,
        _ if job.total_pages > 0 => {
            round2((job.pages_processed as f64 / job.total_pages as f64).clamp(0.0, 1.0))
        }
        _ => 0.0,
    };
    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: job.status,
        progress,
        pages_processed: job.pages_processed,
        total_pages: job.total_pages,
        error_message: job.error_message,
        created_at: job.created_at,
        updated_at: job.updated_at,
        completed_at: job.completed_at,
    }))
}

async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<Json<AnswerResult>> {
    let question = request.question.trim().to_string();
    let length = question.chars().count();
    if !(3..=500).contains(&length) {
        return Err(bad_request("question must be between 3 and 500 characters"));
    }
    if !(1..=10).contains(&request.top_k) {
        return Err(bad_request("top_k must be between 1 and 10"));
    }
    let min_confidence = request.min_confidence.unwrap_or(state.min_confidence);
    if !(0.0..=1.0).contains(&min_confidence) {
        return Err(bad_request("min_confidence must be between 0.0 and 1.0"));
    }
    if state.store.is_empty() {
        return Err(bad_request(
            "No content has been indexed yet. Please ingest content first.",
        ));
    }

    let started = Instant::now();
    let embeddings = state
        .embedder
        .embed(&[question.clone()])
        .await
        .map_err(api_error)?;
    let query = embeddings.into_iter().next().ok_or_else(|| {
        api_error(Error::Embedding(
            "No embedding returned for the question".to_string(),
        ))
    })?;

    let hits = state
        .store
        .search(&query, request.top_k)
        .map_err(api_error)?;
    let mut result = state.answerer.answer(&question, &hits, min_confidence).await;
    let total_ms = started.elapsed().as_secs_f64() * 1000.0;
    result.processing_time_ms = round2(total_ms);

    if let Err(err) = state
        .jobs
        .log_query(
            &question,
            &result.answer,
            result.confidence,
            result.citations.len(),
            total_ms,
        )
        .await
    {
        warn!("Failed to record query log: {}", err);
    }

    Ok(Json(result))
}

async fn metrics_handler(State(state): State<AppState>) -> ApiResult<Json<MetricsResponse>> {
    let db = state.jobs.metrics().await.map_err(api_error)?;
    let stats = state.store.stats();
    Ok(Json(MetricsResponse {
        total_ingestions: db.total_ingestions,
        total_queries: db.total_queries,
        avg_ingest_time_seconds: round2(db.avg_ingest_time_seconds),
        avg_query_time_ms: round2(db.avg_query_time_ms),
        total_pages_indexed: db.total_pages_indexed,
        index_size_mb: round2(stats.estimated_size_mb),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.jobs.ping().await {
        Ok(()) => true,
        Err(err) => {
            warn!("Database health check failed: {}", err);
            false
        }
    };
    // The vector store is in-process, so it is reachable whenever we are
    let vector_store = true;
    let status = if database && vector_store {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        services: ServiceHealth {
            database,
            vector_store,
        },
    })
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ingest", post(ingest_handler))
        .route("/api/ingest/{job_id}", get(status_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// Bind and serve the API until the process is stopped
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::answer::Generator;
    use crate::config::Config;
    use crate::store::IndexedChunk;

    struct StubEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub-embedder"
        }
    }

    struct StubGenerator {
        reply: String,
    }

    #[async_trait]
    impl Generator for StubGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "stub-generator"
        }
    }

    async fn spawn_app() -> (String, Arc<VectorStore>, TempDir) {
        let mut config = Config::default();
        config.crawler.politeness_delay_ms = 0;
        config.crawler.timeout_secs = 5;
        config.crawler.max_retries = 0;
        config.embedding.dimension = 4;

        let tmp = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::new(4));
        let jobs = JobStore::connect(&tmp.path().join("jobs.db")).await.unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder { dimension: 4 });
        let ingestion = Arc::new(
            IngestionService::new(&config, Arc::clone(&embedder), Arc::clone(&store), jobs.clone())
                .unwrap(),
        );
        let answerer = Arc::new(AnswerGenerator::new(
            Box::new(StubGenerator {
                reply: "Docent crawls pages and answers questions [Source 1].".to_string(),
            }),
            &config.answer,
        ));
        let state = AppState::new(
            ingestion,
            Arc::clone(&store),
            embedder,
            answerer,
            jobs,
            config.answer.min_confidence,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("http://{}", addr), store, tmp)
    }

    fn seeded_chunk(id: &str) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            url: "https://docs.example.com/intro".to_string(),
            title: "Introduction".to_string(),
            text: "Docent crawls documentation sites, chunks the cleaned text and \
                   serves grounded answers over whatever has been indexed."
                .to_string(),
            start_offset: 0,
            end_offset: 120,
            index: 0,
            embedding: vec![0.5; 4],
        }
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let (base, _store, _tmp) = spawn_app().await;

        let resp = reqwest::get(format!("{}/api/health", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["database"], true);
        assert_eq!(body["services"]["vector_store"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_index() {
        let (base, _store, _tmp) = spawn_app().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/ask", base))
            .json(&json!({ "question": "What does docent do?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body["detail"],
            "No content has been indexed yet. Please ingest content first."
        );
    }

    #[tokio::test]
    async fn test_ask_validates_question_and_parameters() {
        let (base, store, _tmp) = spawn_app().await;
        store.index(seeded_chunk("chunk-1")).unwrap();
        let client = reqwest::Client::new();

        let cases = [
            json!({ "question": "hi" }),
            json!({ "question": "  hi  " }),
            json!({ "question": "x".repeat(501) }),
            json!({ "question": "What does docent do?", "top_k": 0 }),
            json!({ "question": "What does docent do?", "top_k": 11 }),
            json!({ "question": "What does docent do?", "min_confidence": 1.5 }),
        ];
        for case in &cases {
            let resp = client
                .post(format!("{}/api/ask", base))
                .json(case)
                .send()
                .await
                .unwrap();
            assert_eq!(
                resp.status(),
                reqwest::StatusCode::BAD_REQUEST,
                "case: {}",
                case
            );
        }
    }

    #[tokio::test]
    async fn test_ask_answers_from_indexed_content() {
        let (base, store, _tmp) = spawn_app().await;
        store.index(seeded_chunk("chunk-1")).unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/ask", base))
            .json(&json!({ "question": "What does docent do?", "top_k": 3 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body["answer"],
            "Docent crawls pages and answers questions [Source 1]."
        );
        let citations = body["citations"].as_array().unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0]["url"], "https://docs.example.com/intro");
        assert!(body["confidence"].as_f64().unwrap() > 0.0);
        assert!(body["processing_time_ms"].as_f64().unwrap() >= 0.0);

        let metrics: Value = reqwest::get(format!("{}/api/metrics", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(metrics["total_queries"], 1);
    }

    #[tokio::test]
    async fn test_ingest_validates_request_bounds() {
        let (base, _store, _tmp) = spawn_app().await;
        let client = reqwest::Client::new();

        let cases = [
            (json!({ "urls": [] }), "At least one URL is required"),
            (
                json!({ "urls": ["https://example.com"], "max_pages": 0 }),
                "max_pages must be between 1 and 500",
            ),
            (
                json!({ "urls": ["https://example.com"], "max_pages": 501 }),
                "max_pages must be between 1 and 500",
            ),
            (
                json!({ "urls": ["https://example.com"], "max_depth": 0 }),
                "max_depth must be between 1 and 5",
            ),
            (
                json!({ "urls": ["https://example.com"], "max_depth": 6 }),
                "max_depth must be between 1 and 5",
            ),
            (json!({ "urls": ["not a url"] }), "Invalid URL: not a url"),
        ];
        for (case, detail) in &cases {
            let resp = client
                .post(format!("{}/api/ingest", base))
                .json(case)
                .send()
                .await
                .unwrap();
            assert_eq!(
                resp.status(),
                reqwest::StatusCode::BAD_REQUEST,
                "case: {}",
                case
            );
            let body: Value = resp.json().await.unwrap();
            assert_eq!(&body["detail"], detail, "case: {}", case);
        }
    }

    #[tokio::test]
    async fn test_unknown_job_returns_404() {
        let (base, _store, _tmp) = spawn_app().await;

        let resp = reqwest::get(format!("{}/api/ingest/no-such-job", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["detail"], "Job not found");
    }

    #[tokio::test]
    async fn test_metrics_start_at_zero() {
        let (base, _store, _tmp) = spawn_app().await;

        let body: Value = reqwest::get(format!("{}/api/metrics", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total_ingestions"], 0);
        assert_eq!(body["total_queries"], 0);
        assert_eq!(body["avg_ingest_time_seconds"], 0.0);
        assert_eq!(body["avg_query_time_ms"], 0.0);
        assert_eq!(body["total_pages_indexed"], 0);
        assert_eq!(body["index_size_mb"], 0.0);
    }

    #[tokio::test]
    async fn test_ingest_end_to_end_reports_progress() {
        let (base, store, _tmp) = spawn_app().await;
        let server = MockServer::start().await;

        let page = "<html><head><title>Guide</title></head><body><p>Docent indexes \
                    this guide page, and the text is long enough to keep as a \
                    chunk.</p></body></html>";
        Mock::given(method("GET"))
            .and(path("/guide"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(page.as_bytes().to_vec(), "text/html"),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/api/ingest", base))
            .json(&json!({
                "urls": [format!("{}/guide", server.uri())],
                "max_pages": 5,
                "max_depth": 1,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let accepted: Value = resp.json().await.unwrap();
        assert_eq!(accepted["status"], "pending");
        assert_eq!(accepted["message"], "Ingestion started");
        assert!(accepted["created_at"].is_string());
        let job_id = accepted["job_id"].as_str().unwrap().to_string();

        let mut last = Value::Null;
        for _ in 0..200 {
            let resp = reqwest::get(format!("{}/api/ingest/{}", base, job_id))
                .await
                .unwrap();
            assert_eq!(resp.status(), reqwest::StatusCode::OK);
            last = resp.json().await.unwrap();
            let status = last["status"].as_str().unwrap();
            if status == "completed" || status == "failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        assert_eq!(last["status"], "completed", "job: {}", last);
        assert_eq!(last["pages_processed"], 1);
        assert_eq!(last["progress"], 1.0);
        assert!(last["completed_at"].is_string());
        assert!(store.len() >= 1);

        let metrics: Value = reqwest::get(format!("{}/api/metrics", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(metrics["total_ingestions"], 1);
        assert_eq!(metrics["total_pages_indexed"], 1);
    }
}
