//! In-memory vector index
//!
//! This module holds the chunk index and provides:
//! - Add-or-replace upserts keyed by chunk id
//! - Top-K cosine similarity search with deterministic ordering
//! - Index statistics for metrics reporting
//!
//! Vectors are normalized to unit length on insert and query, so the inner
//! product equals cosine similarity. Readers and writers share an RwLock;
//! a chunk is visible either completely or not at all.

use crate::embed::normalize_embedding;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// A chunk as held by the index
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Stable chunk id
    pub id: String,

    /// Source page URL
    pub url: String,

    /// Source page title
    pub title: String,

    /// Chunk text
    pub text: String,

    /// Byte offset of the chunk start in the cleaned page text
    pub start_offset: usize,

    /// Byte offset one past the chunk end
    pub end_offset: usize,

    /// Ordinal of this chunk within its page
    pub index: usize,

    /// Embedding vector (unit length once indexed)
    pub embedding: Vec<f32>,
}

/// A search match with its similarity score
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: IndexedChunk,
    pub similarity: f32,
}

/// Aggregate index statistics
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub chunks: usize,
    pub estimated_size_mb: f64,
}

struct IndexInner {
    /// Entries in insertion order; replacement keeps the original slot
    entries: Vec<IndexedChunk>,
    by_id: HashMap<String, usize>,
    bytes: usize,
}

/// In-memory vector store
pub struct VectorStore {
    dimension: usize,
    inner: RwLock<IndexInner>,
}

impl VectorStore {
    /// Create an empty store for vectors of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(IndexInner {
                entries: Vec::new(),
                by_id: HashMap::new(),
                bytes: 0,
            }),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add a chunk to the index, replacing any entry with the same id
    ///
    /// A replaced chunk keeps its original insertion rank, so search
    /// tie-breaking stays stable across re-ingestion.
    pub fn index(&self, mut chunk: IndexedChunk) -> Result<()> {
        if chunk.embedding.len() != self.dimension {
            return Err(Error::Storage(format!(
                "Vector dimension mismatch for chunk '{}': expected {}, got {}",
                chunk.id,
                self.dimension,
                chunk.embedding.len()
            )));
        }

        chunk.embedding = normalize_embedding(&chunk.embedding);
        let size = Self::entry_bytes(&chunk);

        let mut inner = self.write_lock()?;
        match inner.by_id.get(&chunk.id) {
            Some(&slot) => {
                let old_size = Self::entry_bytes(&inner.entries[slot]);
                inner.bytes = inner.bytes + size - old_size;
                inner.entries[slot] = chunk;
            }
            None => {
                let slot = inner.entries.len();
                inner.by_id.insert(chunk.id.clone(), slot);
                inner.entries.push(chunk);
                inner.bytes += size;
            }
        }

        Ok(())
    }

    /// Top-K search by cosine similarity
    ///
    /// Results are sorted by descending similarity; equal scores keep
    /// insertion order, earliest first. An empty index returns no hits.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(Error::Storage(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = normalize_embedding(query);
        let inner = self.read_lock()?;

        let mut scored: Vec<(usize, f32)> = inner
            .entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| {
                let similarity = entry
                    .embedding
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
                (slot, similarity)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        debug!(
            "Search returned {} of {} indexed chunks",
            scored.len(),
            inner.entries.len()
        );

        Ok(scored
            .into_iter()
            .map(|(slot, similarity)| SearchHit {
                chunk: inner.entries[slot].clone(),
                similarity,
            })
            .collect())
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.read_lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index statistics for metrics reporting
    pub fn stats(&self) -> StoreStats {
        match self.read_lock() {
            Ok(inner) => StoreStats {
                chunks: inner.entries.len(),
                estimated_size_mb: inner.bytes as f64 / (1024.0 * 1024.0),
            },
            Err(_) => StoreStats {
                chunks: 0,
                estimated_size_mb: 0.0,
            },
        }
    }

    fn entry_bytes(chunk: &IndexedChunk) -> usize {
        chunk.embedding.len() * std::mem::size_of::<f32>()
            + chunk.text.len()
            + chunk.url.len()
            + chunk.title.len()
            + chunk.id.len()
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexInner>> {
        self.inner
            .read()
            .map_err(|_| Error::Storage("Vector index lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexInner>> {
        self.inner
            .write()
            .map_err(|_| Error::Storage("Vector index lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_chunk(id: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            url: format!("https://example.com/{}", id),
            title: format!("Page {}", id),
            text: format!("text for {}", id),
            start_offset: 0,
            end_offset: 10,
            index: 0,
            embedding,
        }
    }

    #[test]
    fn test_search_descending_similarity() {
        let store = VectorStore::new(2);
        store.index(make_chunk("far", vec![0.0, 1.0])).unwrap();
        store.index(make_chunk("near", vec![1.0, 0.0])).unwrap();
        store.index(make_chunk("mid", vec![1.0, 1.0])).unwrap();

        let hits = store.search(&[1.0, 0.0], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.id, "near");
        assert_eq!(hits[1].chunk.id, "mid");
        assert_eq!(hits[2].chunk.id, "far");
        assert!(hits[0].similarity >= hits[1].similarity);
        assert!(hits[1].similarity >= hits[2].similarity);
    }

    #[test]
    fn test_tie_break_by_insertion_order() {
        let store = VectorStore::new(2);
        store.index(make_chunk("second", vec![1.0, 0.0])).unwrap();
        store.index(make_chunk("first", vec![1.0, 0.0])).unwrap();

        let hits = store.search(&[1.0, 0.0], 2).unwrap();

        assert_eq!(hits[0].chunk.id, "second");
        assert_eq!(hits[1].chunk.id, "first");
    }

    #[test]
    fn test_index_replaces_by_id() {
        let store = VectorStore::new(2);
        store.index(make_chunk("a", vec![1.0, 0.0])).unwrap();

        let mut updated = make_chunk("a", vec![0.0, 1.0]);
        updated.text = "replacement text".to_string();
        store.index(updated).unwrap();

        assert_eq!(store.len(), 1);
        let hits = store.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].chunk.text, "replacement text");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_limit() {
        let store = VectorStore::new(2);
        for i in 0..10 {
            store
                .index(make_chunk(&format!("c{}", i), vec![1.0, i as f32]))
                .unwrap();
        }

        let hits = store.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_empty_index_returns_no_hits() {
        let store = VectorStore::new(4);
        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = VectorStore::new(4);
        let result = store.index(make_chunk("bad", vec![1.0, 0.0]));
        assert!(matches!(result, Err(Error::Storage(_))));

        let result = store.search(&[1.0, 0.0], 5);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_stats_track_size() {
        let store = VectorStore::new(2);
        assert_eq!(store.stats().chunks, 0);

        store.index(make_chunk("a", vec![1.0, 0.0])).unwrap();
        let stats = store.stats();
        assert_eq!(stats.chunks, 1);
        assert!(stats.estimated_size_mb > 0.0);
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        let store = Arc::new(VectorStore::new(2));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    store
                        .index(make_chunk(&format!("w{}", i), vec![1.0, i as f32]))
                        .unwrap();
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let hits = store.search(&[1.0, 0.0], 5).unwrap();
                    for hit in hits {
                        // Visible chunks are always complete
                        assert!(!hit.chunk.id.is_empty());
                        assert_eq!(hit.chunk.embedding.len(), 2);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.len(), 500);
    }
}
