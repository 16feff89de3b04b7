//! Breadth-first web crawling within a domain allowlist
//!
//! This module provides:
//! - URL fetching with configurable timeouts and retries
//! - Per-host politeness delays
//! - Crawl depth and page limits
//! - Deduplication of revisits and redirect targets

mod frontier;

pub use frontier::*;

use crate::chunk::compute_text_hash;
use crate::config::CrawlerConfig;
use crate::error::{Error, Result};
use crate::parse::parse_html;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// A crawled page with its cleaned text
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
    pub content_hash: String,
}

/// Per-job crawl limits and scope
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub max_pages: u32,
    pub max_depth: u32,
    pub allowed_domains: Vec<String>,
}

/// Web crawler state
pub struct Crawler {
    client: Client,
    config: CrawlerConfig,
    politeness: Arc<HostRateLimiter>,
}

impl Crawler {
    /// Create a new crawler
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        let politeness = Arc::new(HostRateLimiter::new(config.politeness_delay_ms));

        Ok(Self {
            client,
            config,
            politeness,
        })
    }

    /// Crawl breadth-first from the seed URLs
    ///
    /// Fetches up to `max_pages` pages, following links up to `max_depth`
    /// hops from the seeds (seeds are depth 0), never leaving the allowed
    /// domains. Failed fetches are logged and skipped. `on_progress` is
    /// called after each successful page with (pages so far, estimated
    /// total).
    pub async fn crawl(
        &self,
        seeds: &[Url],
        options: &CrawlOptions,
        mut on_progress: impl FnMut(u32, u32),
    ) -> Result<Vec<Page>> {
        let allowed: HashSet<String> = options
            .allowed_domains
            .iter()
            .map(|d| d.to_lowercase())
            .collect();

        let mut frontier = Frontier::new();
        for seed in seeds {
            if !is_fetchable(seed) {
                warn!("Skipping non-http seed: {}", seed);
                continue;
            }
            let host = seed.host_str().unwrap_or("");
            if !host_allowed(host, &allowed, self.config.allow_subdomains) {
                warn!("Seed outside allowed domains: {}", seed);
                continue;
            }
            frontier.push(seed.clone(), 0);
        }

        let mut pages: Vec<Page> = Vec::new();
        let mut attempts = 0u32;
        let max_attempts = options.max_pages.saturating_mul(5).max(1);

        info!(
            seeds = seeds.len(),
            max_pages = options.max_pages,
            max_depth = options.max_depth,
            workers = self.config.workers,
            "Starting crawl"
        );

        while !frontier.is_empty() && (pages.len() as u32) < options.max_pages {
            if attempts >= max_attempts {
                warn!(
                    "Reached crawl attempt limit ({}); stopping to avoid stalling",
                    max_attempts
                );
                break;
            }

            let budget = (options.max_pages as usize - pages.len()).min(self.config.workers.max(1));
            let batch = frontier.pop_batch(budget);
            attempts += batch.len() as u32;

            let mut handles = Vec::with_capacity(batch.len());
            for task in batch {
                let client = self.client.clone();
                let politeness = Arc::clone(&self.politeness);
                let max_retries = self.config.max_retries;
                handles.push(tokio::spawn(async move {
                    let result = fetch_page(&client, &politeness, &task.url, max_retries).await;
                    (task, result)
                }));
            }

            for joined in join_all(handles).await {
                let (task, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Crawl worker panicked: {}", e);
                        continue;
                    }
                };

                let (final_url, body) = match result {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", task.url, e);
                        continue;
                    }
                };

                if task.depth > options.max_depth {
                    continue;
                }

                // Redirects may land on a URL we already know about
                if normalize_url(&final_url) != normalize_url(&task.url) {
                    if !frontier.mark_seen(&final_url) {
                        debug!("Redirect target already visited: {}", final_url);
                        continue;
                    }
                    let final_host = final_url.host_str().unwrap_or("");
                    if !host_allowed(final_host, &allowed, self.config.allow_subdomains) {
                        debug!("Redirect left allowed domains: {}", final_url);
                        continue;
                    }
                }

                let parsed = parse_html(&body, Some(final_url.as_str()));
                if parsed.text.trim().is_empty() {
                    debug!("No extractable text: {}", final_url);
                    continue;
                }

                let mut internal_links = Vec::new();
                for raw in &parsed.links {
                    let link = match Url::parse(raw) {
                        Ok(u) => u,
                        Err(_) => continue,
                    };
                    if !is_fetchable(&link) {
                        continue;
                    }
                    let host = link.host_str().unwrap_or("");
                    if !host_allowed(host, &allowed, self.config.allow_subdomains) {
                        continue;
                    }
                    internal_links.push(link.to_string());
                    if task.depth < options.max_depth {
                        frontier.push(link, task.depth + 1);
                    }
                }

                let title = parsed
                    .title
                    .unwrap_or_else(|| final_url.to_string());
                let content_hash = compute_text_hash(&parsed.text);

                pages.push(Page {
                    url: final_url.to_string(),
                    title,
                    text: parsed.text,
                    links: internal_links,
                    depth: task.depth,
                    fetched_at: Utc::now(),
                    content_hash,
                });

                let estimate = frontier
                    .seen_len()
                    .min(options.max_pages as usize)
                    .max(pages.len()) as u32;
                on_progress(pages.len() as u32, estimate);

                if (pages.len() as u32) >= options.max_pages {
                    info!("Reached max pages limit ({})", options.max_pages);
                    break;
                }
            }
        }

        info!("Crawled {} pages from {} seeds", pages.len(), seeds.len());
        Ok(pages)
    }
}

/// Serializes requests to the same host with a minimum interval
pub struct HostRateLimiter {
    min_interval: Duration,
    hosts: Mutex<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl HostRateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            min_interval: Duration::from_millis(delay_ms),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until this host's politeness interval has elapsed
    pub async fn wait(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut hosts = self.hosts.lock().await;
            Arc::clone(hosts.entry(host.to_string()).or_default())
        };

        // Holding the per-host lock across the sleep serializes fetches
        // to that host
        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Fetch one URL, retrying transient failures with backoff
async fn fetch_page(
    client: &Client,
    politeness: &HostRateLimiter,
    url: &Url,
    max_retries: u32,
) -> Result<(Url, String)> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Fetch(format!("URL has no host: {}", url)))?
        .to_string();

    for attempt in 0..=max_retries {
        politeness.wait(&host).await;
        debug!("Fetching: {} (attempt {})", url, attempt + 1);

        let response = match client.get(url.as_str()).send().await {
            Ok(r) => r,
            Err(e) => {
                if is_retryable_error(&e) && attempt < max_retries {
                    warn!("Fetch error for {} (attempt {}): {}", url, attempt + 1, e);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(Error::Fetch(format!("{}: {}", url, e)));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if attempt < max_retries {
                warn!("HTTP {} for {} (attempt {})", status, url, attempt + 1);
                tokio::time::sleep(retry_backoff(attempt)).await;
                continue;
            }
            return Err(Error::Fetch(format!("HTTP {}: {}", status, url)));
        }
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {}: {}", status, url)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("text/html") {
            return Err(Error::Fetch(format!(
                "Unsupported content type {:?}: {}",
                content_type, url
            )));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("{}: body read failed: {}", url, e)))?;
        return Ok((final_url, body));
    }

    Err(Error::Fetch(format!("Retries exhausted: {}", url)))
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(5);
    Duration::from_millis(500 * (1 << capped))
}

fn is_fetchable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Check a host against the allowlist. An empty allowlist permits every host.
pub fn host_allowed(host: &str, allowed: &HashSet<String>, allow_subdomains: bool) -> bool {
    if allowed.is_empty() {
        return true;
    }
    if host.is_empty() {
        return false;
    }
    let host = host.to_lowercase();
    if allowed.contains(&host) {
        return true;
    }
    allow_subdomains
        && allowed
            .iter()
            .any(|domain| host.ends_with(&format!(".{}", domain)))
}

/// Normalize a URL for deduplication
///
/// Strips the fragment and any trailing slash on non-root paths. The
/// query string is kept, distinct queries are distinct pages.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let trimmed = {
        let path = normalized.path();
        if path != "/" && path.ends_with('/') {
            Some(path.trim_end_matches('/').to_string())
        } else {
            None
        }
    };
    if let Some(path) = trimmed {
        normalized.set_path(&path);
    }

    normalized.to_string()
}
