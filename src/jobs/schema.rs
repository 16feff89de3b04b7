//! SQLite schema definition

/// SQL schema for the job database
pub const SCHEMA_SQL: &str = r#"
-- Ingestion jobs: lifecycle and progress of crawl-and-index runs
CREATE TABLE IF NOT EXISTS ingest_jobs (
    job_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    urls_json TEXT NOT NULL,
    max_pages INTEGER NOT NULL,
    max_depth INTEGER NOT NULL,
    domain_allowlist_json TEXT,
    pages_processed INTEGER NOT NULL DEFAULT 0,
    total_pages INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT
);

-- Query logs: one row per answered question
CREATE TABLE IF NOT EXISTS query_logs (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    confidence REAL NOT NULL,
    citation_count INTEGER NOT NULL,
    duration_ms REAL NOT NULL,
    created_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_jobs_status ON ingest_jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON ingest_jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_query_logs_created ON query_logs(created_at);
"#;
