//! Default values for configuration

/// Default server bind host
pub fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

/// Default server port
pub fn default_server_port() -> u16 {
    8000
}

/// Default maximum pages per job when the request omits it
pub fn default_crawler_max_pages() -> u32 {
    50
}

/// Default maximum crawl depth when the request omits it
pub fn default_crawler_max_depth() -> u32 {
    2
}

/// Default number of concurrent fetch workers
pub fn default_crawler_workers() -> usize {
    4
}

/// Default per-fetch timeout in seconds
pub fn default_crawler_timeout() -> u64 {
    30
}

/// Default retries after a failed fetch
pub fn default_crawler_max_retries() -> u32 {
    2
}

/// Default minimum interval between requests to one host (milliseconds)
pub fn default_crawler_politeness_delay_ms() -> u64 {
    1000
}

/// Default user agent
pub fn default_crawler_user_agent() -> String {
    format!("docent/{} (Content Indexer)", env!("CARGO_PKG_VERSION"))
}

/// Default chunk size in characters
pub fn default_chunk_size() -> usize {
    1500
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default minimum chunk length for indexing
pub fn default_min_chunk_chars() -> usize {
    100
}

/// Default embedding backend URL (OpenAI-compatible)
pub fn default_embedding_url() -> String {
    std::env::var("DOCENT_EMBEDDING_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    1536
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default retries for a failed embedding batch
pub fn default_embedding_max_retries() -> u32 {
    3
}

/// Default embedding request timeout in seconds
pub fn default_embedding_timeout() -> u64 {
    30
}

/// Default environment variable name for the embedding API key
pub fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default generation backend URL (OpenAI-compatible)
pub fn default_generation_url() -> String {
    std::env::var("DOCENT_GENERATION_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string())
}

/// Default generation model
pub fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default maximum tokens for a generated answer
pub fn default_generation_max_tokens() -> u32 {
    1000
}

/// Default sampling temperature
pub fn default_generation_temperature() -> f32 {
    0.3
}

/// Default generation request timeout in seconds
pub fn default_generation_timeout() -> u64 {
    60
}

/// Default environment variable name for the generation API key
pub fn default_generation_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default similarity floor below which retrieval counts as a miss
pub fn default_similarity_floor() -> f32 {
    0.25
}

/// Default confidence threshold when the request omits it
pub fn default_min_confidence() -> f32 {
    0.7
}

/// Default excerpt length for citations, in words
pub fn default_max_excerpt_words() -> usize {
    25
}
