//! Ingestion pipeline: crawl, chunk, embed, index
//!
//! Jobs are accepted immediately and run in the background. A single
//! updater task owns all job-record writes, fed through an event
//! channel, so crawl progress never races the terminal status.

use crate::chunk::{chunk_id, chunk_text};
use crate::config::{ChunkingConfig, Config};
use crate::crawl::{CrawlOptions, Crawler, Page};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::jobs::{IngestJob, JobStore};
use crate::store::{IndexedChunk, VectorStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};
use url::Url;

/// Parameters for a new ingestion job
#[derive(Debug, Clone)]
pub struct IngestParams {
    pub urls: Vec<String>,
    pub max_pages: u32,
    pub max_depth: u32,
    pub domain_allowlist: Option<Vec<String>>,
}

enum JobEvent {
    Started,
    Progress { pages: u32, total: u32 },
    Completed { pages: u32, total: u32 },
    Failed { message: String },
}

/// Accepts ingestion jobs and runs them in the background
pub struct IngestionService {
    pipeline: Pipeline,
    jobs: JobStore,
}

impl IngestionService {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        jobs: JobStore,
    ) -> Result<Self> {
        let crawler = Crawler::new(config.crawler.clone())?;
        Ok(Self {
            pipeline: Pipeline {
                crawler: Arc::new(crawler),
                embedder,
                store,
                chunking: config.chunking.clone(),
                batch_size: config.embedding.batch_size,
            },
            jobs,
        })
    }

    /// Validate and accept a job, returning the pending job record
    ///
    /// The pipeline itself runs on a spawned task; callers poll
    /// [`get_status`](Self::get_status) to follow it.
    pub async fn submit(&self, params: IngestParams) -> Result<IngestJob> {
        if params.urls.is_empty() {
            return Err(Error::Validation("At least one URL is required".to_string()));
        }

        let mut seeds = Vec::with_capacity(params.urls.len());
        for raw in &params.urls {
            let url = Url::parse(raw)
                .map_err(|_| Error::Validation(format!("Invalid URL: {}", raw)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Validation(format!("Invalid URL: {}", raw)));
            }
            seeds.push(url);
        }

        // Crawl scope defaults to the seed hosts
        let allowed_domains = match &params.domain_allowlist {
            Some(domains) if !domains.is_empty() => {
                domains.iter().map(|d| d.to_lowercase()).collect()
            }
            _ => seeds
                .iter()
                .filter_map(|u| u.host_str())
                .map(|h| h.to_lowercase())
                .collect(),
        };

        let job = IngestJob::new(
            &params.urls,
            params.max_pages,
            params.max_depth,
            params.domain_allowlist.as_deref(),
        );
        self.jobs.insert_job(&job).await?;
        info!(
            "Accepted ingestion job {} with {} seed(s)",
            job.job_id,
            seeds.len()
        );

        let options = CrawlOptions {
            max_pages: params.max_pages,
            max_depth: params.max_depth,
            allowed_domains,
        };

        let pipeline = self.pipeline.clone();
        let jobs = self.jobs.clone();
        let job_id = job.job_id.clone();
        tokio::spawn(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let updater = tokio::spawn(apply_job_events(jobs, job_id.clone(), rx));

            pipeline.run(seeds, options, &tx).await;

            drop(tx);
            if let Err(e) = updater.await {
                warn!("Job updater for {} panicked: {}", job_id, e);
            }
        });

        Ok(job)
    }

    /// Look up the current state of a job
    pub async fn get_status(&self, job_id: &str) -> Result<IngestJob> {
        self.jobs.get_job(job_id).await
    }
}

/// Applies job events to the database in arrival order
async fn apply_job_events(jobs: JobStore, job_id: String, mut rx: UnboundedReceiver<JobEvent>) {
    while let Some(event) = rx.recv().await {
        let result = match event {
            JobEvent::Started => jobs.mark_running(&job_id).await,
            JobEvent::Progress { pages, total } => {
                jobs.update_progress(&job_id, pages, total).await
            }
            JobEvent::Completed { pages, total } => jobs.complete_job(&job_id, pages, total).await,
            JobEvent::Failed { message } => jobs.fail_job(&job_id, &message).await,
        };
        if let Err(e) = result {
            warn!("Failed to record job event for {}: {}", job_id, e);
        }
    }
}

struct PendingChunk {
    id: String,
    url: String,
    title: String,
    start_offset: usize,
    end_offset: usize,
    index: usize,
}

#[derive(Clone)]
struct Pipeline {
    crawler: Arc<Crawler>,
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl Pipeline {
    async fn run(&self, seeds: Vec<Url>, options: CrawlOptions, events: &UnboundedSender<JobEvent>) {
        let _ = events.send(JobEvent::Started);

        let seen_total = Arc::new(AtomicU32::new(seeds.len() as u32));
        let progress_tx = events.clone();
        let progress_total = Arc::clone(&seen_total);
        let crawl_result = self
            .crawler
            .crawl(&seeds, &options, |pages, total| {
                progress_total.store(total, Ordering::Relaxed);
                let _ = progress_tx.send(JobEvent::Progress { pages, total });
            })
            .await;

        let pages = match crawl_result {
            Ok(pages) => pages,
            Err(e) => {
                let _ = events.send(JobEvent::Failed {
                    message: e.to_string(),
                });
                return;
            }
        };

        if pages.is_empty() {
            let _ = events.send(JobEvent::Failed {
                message: "No pages could be crawled from the provided URLs".to_string(),
            });
            return;
        }

        let crawled = pages.len() as u32;
        let total = seen_total.load(Ordering::Relaxed).max(crawled);

        // Identical extracted text only gets indexed once
        let mut seen_hashes = HashSet::new();
        let unique: Vec<&Page> = pages
            .iter()
            .filter(|p| seen_hashes.insert(p.content_hash.clone()))
            .collect();
        if unique.len() < pages.len() {
            debug!(
                "Skipped {} duplicate page(s) by content hash",
                pages.len() - unique.len()
            );
        }

        let mut pending: Vec<PendingChunk> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for page in &unique {
            let chunks = chunk_text(&page.text, &self.chunking);
            let only_chunk = chunks.len() == 1;
            for chunk in chunks {
                // Short fragments carry little signal, but a page whose
                // whole text is one short chunk is still worth keeping
                if !only_chunk && chunk.text.chars().count() < self.chunking.min_chunk_chars {
                    continue;
                }
                pending.push(PendingChunk {
                    id: chunk_id(&page.url, chunk.index, &chunk.text),
                    url: page.url.clone(),
                    title: page.title.clone(),
                    start_offset: chunk.start_offset,
                    end_offset: chunk.end_offset,
                    index: chunk.index,
                });
                texts.push(chunk.text);
            }
        }

        if pending.is_empty() {
            info!("Ingestion produced no indexable chunks");
            let _ = events.send(JobEvent::Completed {
                pages: crawled,
                total,
            });
            return;
        }

        let embeddings = match embed_in_batches(self.embedder.as_ref(), &texts, self.batch_size).await
        {
            Ok(embeddings) => embeddings,
            Err(e) => {
                let _ = events.send(JobEvent::Failed {
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut indexed = 0usize;
        for ((meta, text), embedding) in pending.into_iter().zip(texts).zip(embeddings) {
            let chunk = IndexedChunk {
                id: meta.id,
                url: meta.url,
                title: meta.title,
                text,
                start_offset: meta.start_offset,
                end_offset: meta.end_offset,
                index: meta.index,
                embedding,
            };
            if let Err(e) = self.store.index(chunk) {
                let _ = events.send(JobEvent::Failed {
                    message: e.to_string(),
                });
                return;
            }
            indexed += 1;
        }

        info!(
            "Indexed {} chunk(s) from {} page(s)",
            indexed,
            unique.len()
        );
        let _ = events.send(JobEvent::Completed {
            pages: crawled,
            total,
        });
    }
}
