//! Knowledge Retrieval
//!
//! The orchestrator consumes the `KnowledgeRetriever` port only. Behind it
//! sits an in-process vector index: text is chunked, embedded through the
//! `EmbeddingClient` port and ranked by cosine similarity. Ties in score
//! keep insertion order so retrieval stays reproducible.

use super::types::RetrievedPassage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Chunking parameters carried over from the reference ingestion pipeline
const CHUNK_SIZE: usize = 1000;
const CHUNK_OVERLAP: usize = 200;

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

// ============================================================
// ERRORS
// ============================================================

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The underlying store or the embedding upstream is unreachable
    #[error("knowledge store unavailable: {0}")]
    Unavailable(String),
    /// The index holds no documents at all
    #[error("knowledge store is empty")]
    Empty,
}

// ============================================================
// PORTS
// ============================================================

/// Retrieval contract consumed by the orchestrator
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Top-k passages for `query`, descending relevance
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError>;
}

/// Text-to-vector contract used by the index
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

// ============================================================
// OPENAI EMBEDDINGS
// ============================================================

/// `EmbeddingClient` backed by the OpenAI embeddings endpoint
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        if self.api_key.is_empty() {
            return Err(RetrievalError::Unavailable(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: EMBEDDING_MODEL,
                input: text,
            })
            .send()
            .await
            .map_err(|err| RetrievalError::Unavailable(format!("embedding request: {err}")))?;

        if !response.status().is_success() {
            return Err(RetrievalError::Unavailable(format!(
                "embedding upstream returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| RetrievalError::Unavailable(format!("embedding response: {err}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RetrievalError::Unavailable("empty embedding response".to_string()))
    }
}

// ============================================================
// VECTOR INDEX
// ============================================================

struct IndexedChunk {
    content: String,
    metadata: HashMap<String, String>,
    vector: Vec<f32>,
}

/// In-process cosine-similarity index. Read-heavy: ingestion is rare,
/// retrieval runs on every RAG turn.
pub struct VectorIndex {
    embeddings: Arc<dyn EmbeddingClient>,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl VectorIndex {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            embeddings,
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Chunk, embed and index a document. Returns the number of chunks
    /// added.
    pub async fn add_text(
        &self,
        text: &str,
        metadata: HashMap<String, String>,
    ) -> Result<usize, RetrievalError> {
        let pieces = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
        let mut indexed = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let vector = self.embeddings.embed(&piece).await?;
            indexed.push(IndexedChunk {
                content: piece,
                metadata: metadata.clone(),
                vector,
            });
        }

        let count = indexed.len();
        let mut chunks = self.chunks.write().unwrap();
        chunks.extend(indexed);
        Ok(count)
    }

    /// Drop every indexed document
    pub fn clear(&self) {
        self.chunks.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeRetriever for VectorIndex {
    async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if self.is_empty() {
            return Err(RetrievalError::Empty);
        }

        let query_vector = self.embeddings.embed(query).await?;

        let chunks = self.chunks.read().unwrap();
        let mut passages: Vec<RetrievedPassage> = chunks
            .iter()
            .map(|chunk| RetrievedPassage {
                content: chunk.content.clone(),
                source_metadata: chunk.metadata.clone(),
                score: cosine_similarity(&query_vector, &chunk.vector),
            })
            .collect();

        // Stable sort: equal scores keep index insertion order
        passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        passages.truncate(k);
        Ok(passages)
    }
}

// ============================================================
// HELPERS
// ============================================================

/// Fixed-size character chunking with overlap, split on char boundaries
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
