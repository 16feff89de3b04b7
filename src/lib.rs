//! docent - a self-hosted RAG backend
//!
//! This crate provides:
//! - A polite breadth-first crawler for pulling web content into the index
//! - Chunking, embedding and an in-memory vector store with cosine search
//! - An HTTP API for ingestion jobs and grounded, cited question answering

pub mod answer;
pub mod api;
pub mod chunk;
pub mod config;
pub mod crawl;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod parse;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
