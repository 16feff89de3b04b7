//! Grounded answer generation
//!
//! Builds a numbered source context from retrieved chunks, asks the
//! generation backend for an answer that cites `[Source N]` markers,
//! then extracts citations, scores confidence, and flags gaps.

mod http_backend;

pub use http_backend::*;

use crate::config::AnswerConfig;
use crate::error::{Error, Result};
use crate::store::SearchHit;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

const CITATION_PATTERN: &str = r"\[Source (\d+)\]";

/// Phrases that signal the generator could not fully answer
const UNCERTAINTY_MARKERS: &[&str] = &[
    "i don't have",
    "insufficient",
    "unclear",
    "not enough",
    "missing",
    "cannot determine",
    "unable to",
];

/// Trait for answer generation providers
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate an answer for the given prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a generator based on configuration
pub fn create_generator(
    config: &AnswerConfig,
    api_key: Option<String>,
) -> Result<Box<dyn Generator>> {
    let generator = HttpGenerator::new(config, api_key)?;
    Ok(Box::new(generator))
}

/// A reference back to the source chunk supporting part of an answer
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    pub excerpt: String,
    pub chunk_id: String,
    pub relevance_score: f32,
}

/// The assembled answer with its supporting evidence
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_information: Option<Vec<String>>,
    pub processing_time_ms: f64,
}

/// Answer generator over retrieved chunks
pub struct AnswerGenerator {
    generator: Box<dyn Generator>,
    similarity_floor: f32,
    max_excerpt_words: usize,
}

impl AnswerGenerator {
    pub fn new(generator: Box<dyn Generator>, config: &AnswerConfig) -> Self {
        Self {
            generator,
            similarity_floor: config.similarity_floor,
            max_excerpt_words: config.max_excerpt_words,
        }
    }

    /// Produce a grounded answer for the question from the retrieved chunks
    ///
    /// `hits` are expected in descending similarity order, as returned by
    /// the vector store. Never fails outright on generation errors; those
    /// degrade into a zero-confidence result with the gap flagged.
    pub async fn answer(
        &self,
        question: &str,
        hits: &[SearchHit],
        min_confidence: f32,
    ) -> AnswerResult {
        let started = Instant::now();

        if hits.is_empty() {
            return AnswerResult {
                answer: "I don't have enough information to answer this question.".to_string(),
                citations: Vec::new(),
                confidence: 0.0,
                missing_information: Some(vec!["No relevant sources found".to_string()]),
                processing_time_ms: elapsed_ms(started),
            };
        }

        let prompt = build_prompt(question, hits);
        let answer_text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                return AnswerResult {
                    answer: "An error occurred while generating the answer.".to_string(),
                    citations: Vec::new(),
                    confidence: 0.0,
                    missing_information: Some(vec!["Generation error".to_string()]),
                    processing_time_ms: elapsed_ms(started),
                };
            }
        };

        let citations = self.extract_citations(&answer_text, hits);
        let confidence = calculate_confidence(&answer_text, citations.len(), hits);
        debug!(
            "Generated answer with {} citations, confidence {}",
            citations.len(),
            confidence
        );

        let best_similarity = hits.first().map(|h| h.similarity).unwrap_or(0.0);
        let missing_information = if confidence < min_confidence
            || best_similarity < self.similarity_floor
        {
            Some(identify_missing_information(&answer_text))
        } else {
            None
        };

        AnswerResult {
            answer: answer_text,
            citations,
            confidence,
            missing_information,
            processing_time_ms: elapsed_ms(started),
        }
    }

    /// Collect citations for every `[Source N]` marker that maps to a chunk
    fn extract_citations(&self, answer: &str, hits: &[SearchHit]) -> Vec<Citation> {
        let mut citations: Vec<Citation> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        if let Ok(re) = Regex::new(CITATION_PATTERN) {
            for caps in re.captures_iter(answer) {
                let number: usize = match caps[1].parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                if number == 0 || number > hits.len() || !seen.insert(number) {
                    continue;
                }

                let hit = &hits[number - 1];
                citations.push(Citation {
                    title: hit.chunk.title.clone(),
                    url: hit.chunk.url.clone(),
                    excerpt: make_excerpt(&hit.chunk.text, self.max_excerpt_words),
                    chunk_id: hit.chunk.id.clone(),
                    relevance_score: hit.similarity.clamp(0.0, 1.0),
                });
            }
        }

        citations.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        citations
    }
}

/// Compose the numbered source context and instructions
fn build_prompt(question: &str, hits: &[SearchHit]) -> String {
    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        context.push_str(&format!(
            "[Source {}] (URL: {}, Title: {})\n{}\n\n",
            i + 1,
            hit.chunk.url,
            hit.chunk.title,
            hit.chunk.text
        ));
    }

    format!(
        "Answer the question using ONLY the sources below.\n\n\
         Rules:\n\
         1. Base every statement on the provided sources\n\
         2. Include at least one citation [Source N] per paragraph\n\
         3. If the sources do not cover the question, say so explicitly\n\n\
         Sources:\n{}\n\
         Question: {}\n\n\
         Provide a well-structured answer with inline citations [Source N]. \
         If you cannot fully answer the question, explain what information is missing.",
        context, question
    )
}

/// Confidence from citation count, retrieval similarity, and answer length
///
/// `0.4 * min(citations/3, 1) + 0.4 * mean(top-3 similarity) +
/// 0.2 * min(words/100, 1)`, rounded to two decimals. Monotonic in each
/// input.
fn calculate_confidence(answer: &str, citation_count: usize, hits: &[SearchHit]) -> f32 {
    if hits.is_empty() {
        return 0.0;
    }

    let citation_score = (citation_count as f32 / 3.0).min(1.0);

    let top = hits.len().min(3);
    let avg_relevance = hits[..top]
        .iter()
        .map(|h| h.similarity.clamp(0.0, 1.0))
        .sum::<f32>()
        / top as f32;

    let word_count = answer.split_whitespace().count();
    let length_score = (word_count as f32 / 100.0).min(1.0);

    let confidence = citation_score * 0.4 + avg_relevance * 0.4 + length_score * 0.2;
    (confidence * 100.0).round() / 100.0
}

/// Pull sentences with uncertainty markers out of the answer
fn identify_missing_information(answer: &str) -> Vec<String> {
    let mut missing = Vec::new();
    let answer_lower = answer.to_lowercase();

    for marker in UNCERTAINTY_MARKERS {
        if answer_lower.contains(marker) {
            for sentence in answer.split('.') {
                if sentence.to_lowercase().contains(marker) {
                    let trimmed = sentence.trim();
                    if !trimmed.is_empty() {
                        missing.push(trimmed.to_string());
                    }
                }
            }
            break;
        }
    }

    if missing.is_empty() {
        missing.push("Coverage appears incomplete based on available sources".to_string());
    }

    missing
}

/// First words of the chunk text, ellipsis-suffixed when truncated
fn make_excerpt(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut excerpt = words[..words.len().min(max_words)].join(" ");
    if words.len() > max_words {
        excerpt.push_str("...");
    }
    excerpt
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
