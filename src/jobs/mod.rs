//! Job tracking and query logging using SQLite
//!
//! This module persists everything that must survive a restart:
//! - Ingestion jobs (lifecycle, progress, errors)
//! - Query logs (for latency and usage metrics)

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Ingestion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::Storage(format!("Unknown job status: {}", s))),
        }
    }
}

/// An ingestion job record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: String,
    pub status: String,
    pub urls_json: String,
    pub max_pages: i32,
    pub max_depth: i32,
    pub domain_allowlist_json: Option<String>,
    pub pages_processed: i32,
    pub total_pages: i32,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl IngestJob {
    pub fn new(
        urls: &[String],
        max_pages: u32,
        max_depth: u32,
        domain_allowlist: Option<&[String]>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending.to_string(),
            urls_json: serde_json::to_string(urls).unwrap_or_default(),
            max_pages: max_pages as i32,
            max_depth: max_depth as i32,
            domain_allowlist_json: domain_allowlist
                .map(|d| serde_json::to_string(d).unwrap_or_default()),
            pages_processed: 0,
            total_pages: urls.len() as i32,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn get_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }

    pub fn urls(&self) -> Vec<String> {
        serde_json::from_str(&self.urls_json).unwrap_or_default()
    }
}

/// Aggregates computed from the job database
#[derive(Debug, Clone, Default)]
pub struct DbMetrics {
    pub total_ingestions: u64,
    pub total_queries: u64,
    pub avg_ingest_time_seconds: f64,
    pub avg_query_time_ms: f64,
    pub total_pages_indexed: u64,
}

/// Job database handle
#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open the job database, creating file and schema if needed
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        if !store.is_initialized().await? {
            store.init_schema().await?;
        }
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing job database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='ingest_jobs'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Quick connectivity probe for health reporting
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ===== Job Operations =====

    /// Insert a new job
    pub async fn insert_job(&self, job: &IngestJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_jobs (job_id, status, urls_json, max_pages, max_depth,
                domain_allowlist_json, pages_processed, total_pages, error_message,
                created_at, updated_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.status)
        .bind(&job.urls_json)
        .bind(job.max_pages)
        .bind(job.max_depth)
        .bind(&job.domain_allowlist_json)
        .bind(job.pages_processed)
        .bind(job.total_pages)
        .bind(&job.error_message)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .bind(&job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<IngestJob> {
        let job = sqlx::query_as::<_, IngestJob>("SELECT * FROM ingest_jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        job.ok_or_else(|| Error::NotFound("Job not found".to_string()))
    }

    /// Transition a pending job to running
    pub async fn mark_running(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs SET status = 'running', updated_at = ?
            WHERE job_id = ? AND status = 'pending'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record crawl progress
    ///
    /// Counters only move forward, late or duplicate updates cannot
    /// regress them. Terminal jobs are left untouched.
    pub async fn update_progress(
        &self,
        job_id: &str,
        pages_processed: u32,
        total_pages: u32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs SET
                pages_processed = MAX(pages_processed, ?),
                total_pages = MAX(total_pages, ?),
                updated_at = ?
            WHERE job_id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(pages_processed as i32)
        .bind(total_pages as i32)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a job as completed with its final counters
    pub async fn complete_job(
        &self,
        job_id: &str,
        pages_processed: u32,
        total_pages: u32,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE ingest_jobs SET
                status = 'completed',
                pages_processed = ?,
                total_pages = ?,
                updated_at = ?,
                completed_at = ?
            WHERE job_id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(pages_processed as i32)
        .bind(total_pages as i32)
        .bind(&now)
        .bind(&now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a job as failed with a reason
    pub async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE ingest_jobs SET
                status = 'failed',
                error_message = ?,
                updated_at = ?,
                completed_at = ?
            WHERE job_id = ? AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(error_message)
        .bind(&now)
        .bind(&now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Query Logging =====

    /// Record an answered question
    pub async fn log_query(
        &self,
        question: &str,
        answer: &str,
        confidence: f32,
        citation_count: usize,
        duration_ms: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO query_logs (id, question, answer, confidence, citation_count, duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(question)
        .bind(answer)
        .bind(confidence as f64)
        .bind(citation_count as i32)
        .bind(duration_ms)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Statistics =====

    /// Aggregate job and query statistics
    pub async fn metrics(&self) -> Result<DbMetrics> {
        let total_ingestions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingest_jobs")
            .fetch_one(&self.pool)
            .await?;

        let total_queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_logs")
            .fetch_one(&self.pool)
            .await?;

        let total_pages_indexed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(pages_processed), 0) FROM ingest_jobs WHERE status = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;

        // Ingest durations come from the job timestamps
        let spans: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT created_at, completed_at FROM ingest_jobs
            WHERE status = 'completed' AND completed_at IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let durations: Vec<f64> = spans
            .iter()
            .filter_map(|(start, end)| {
                let start = DateTime::parse_from_rfc3339(start).ok()?;
                let end = DateTime::parse_from_rfc3339(end).ok()?;
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            })
            .collect();
        let avg_ingest_time_seconds = mean(&durations);

        // Query latency averages the most recent window
        let recent: Vec<f64> =
            sqlx::query_scalar("SELECT duration_ms FROM query_logs ORDER BY rowid DESC LIMIT 100")
                .fetch_all(&self.pool)
                .await?;
        let avg_query_time_ms = mean(&recent);

        Ok(DbMetrics {
            total_ingestions: total_ingestions as u64,
            total_queries: total_queries as u64,
            avg_ingest_time_seconds,
            avg_query_time_ms,
            total_pages_indexed: total_pages_indexed as u64,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (JobStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = JobStore::connect(&tmp.path().join("test.db")).await.unwrap();
        (store, tmp)
    }

    fn seed_urls() -> Vec<String> {
        vec!["https://example.com/docs".to_string()]
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let (store, _tmp) = setup_test_db().await;

        let job = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&job).await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), JobStatus::Pending);
        assert_eq!(loaded.urls(), seed_urls());
        assert_eq!(loaded.total_pages, 1);

        store.mark_running(&job.job_id).await.unwrap();
        store.update_progress(&job.job_id, 3, 10).await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), JobStatus::Running);
        assert_eq!(loaded.pages_processed, 3);
        assert_eq!(loaded.total_pages, 10);

        store.complete_job(&job.job_id, 10, 10).await.unwrap();
        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), JobStatus::Completed);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let (store, _tmp) = setup_test_db().await;

        let job = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&job).await.unwrap();
        store.mark_running(&job.job_id).await.unwrap();

        store.update_progress(&job.job_id, 5, 10).await.unwrap();
        store.update_progress(&job.job_id, 2, 8).await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.pages_processed, 5);
        assert_eq!(loaded.total_pages, 10);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let (store, _tmp) = setup_test_db().await;

        let job = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&job).await.unwrap();
        store.complete_job(&job.job_id, 1, 1).await.unwrap();

        store.fail_job(&job.job_id, "late failure").await.unwrap();
        store.update_progress(&job.job_id, 99, 99).await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), JobStatus::Completed);
        assert_eq!(loaded.pages_processed, 1);
        assert!(loaded.error_message.is_none());
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let (store, _tmp) = setup_test_db().await;

        let err = store.get_job("nonexistent").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_job_records_reason() {
        let (store, _tmp) = setup_test_db().await;

        let job = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&job).await.unwrap();
        store.mark_running(&job.job_id).await.unwrap();
        store.fail_job(&job.job_id, "all seeds unreachable").await.unwrap();

        let loaded = store.get_job(&job.job_id).await.unwrap();
        assert_eq!(loaded.get_status().unwrap(), JobStatus::Failed);
        assert_eq!(
            loaded.error_message.as_deref(),
            Some("all seeds unreachable")
        );
    }

    #[tokio::test]
    async fn test_metrics_aggregation() {
        let (store, _tmp) = setup_test_db().await;

        let job = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&job).await.unwrap();
        store.complete_job(&job.job_id, 7, 7).await.unwrap();

        let pending = IngestJob::new(&seed_urls(), 50, 2, None);
        store.insert_job(&pending).await.unwrap();

        store.log_query("q1", "a1", 0.8, 2, 120.0).await.unwrap();
        store.log_query("q2", "a2", 0.6, 1, 80.0).await.unwrap();

        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.total_ingestions, 2);
        assert_eq!(metrics.total_queries, 2);
        assert_eq!(metrics.total_pages_indexed, 7);
        assert!((metrics.avg_query_time_ms - 100.0).abs() < 1e-9);
        assert!(metrics.avg_ingest_time_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_metrics_empty_database() {
        let (store, _tmp) = setup_test_db().await;

        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.total_ingestions, 0);
        assert_eq!(metrics.total_queries, 0);
        assert_eq!(metrics.avg_query_time_ms, 0.0);
        assert_eq!(metrics.avg_ingest_time_seconds, 0.0);
    }
}
