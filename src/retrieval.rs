//! Retrieval pipeline: documents → chunks → in-memory vector index → top-k search.
//!
//! Construction is explicit and ordered. [`RetrievalPipeline::new`] splits the
//! documents up front (so chunking misconfiguration fails at setup), while
//! the embedding pass is deferred until the first [`search`] or an explicit
//! [`build_index`] call.
//!
//! # Build-once guarantee
//!
//! The index lives in a [`tokio::sync::OnceCell`]. Concurrent first callers
//! queue on the cell and exactly one of them runs the embedding pass; the
//! rest observe its result. If the build fails the cell stays empty, so a
//! later call may try again.
//!
//! The index is process memory only and is rebuilt on every start.
//!
//! [`search`]: RetrievalPipeline::search
//! [`build_index`]: RetrievalPipeline::build_index

use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::chunk;
use crate::config::Config;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::error::{HarnessError, Result};
use crate::loader;
use crate::models::{Chunk, Document, ScoredChunk};

/// Chunking knobs, decoupled from the application config.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Chunk/vector pairs in insertion order, searched by brute-force cosine.
pub struct Index {
    entries: Vec<IndexEntry>,
    model: String,
}

impl Index {
    /// Embed `chunks` in batches of `batch_size` and store them in order.
    ///
    /// An empty chunk list produces an empty index without touching the
    /// embedder.
    pub async fn build(chunks: &[Chunk], embedder: &dyn Embedder, batch_size: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(HarnessError::InvalidResponse {
                    service: "embedding",
                    message: format!("expected {} embeddings, got {}", batch.len(), vectors.len()),
                });
            }
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry { chunk, vector }),
            );
        }

        Ok(Self {
            entries,
            model: embedder.model_name().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding model the vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Top `k` chunks by cosine similarity, highest first.
    ///
    /// The sort is stable, so equal scores keep insertion order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}

/// Owns the corpus and its lazily built index.
pub struct RetrievalPipeline {
    documents: Vec<Document>,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    index: OnceCell<Index>,
}

impl RetrievalPipeline {
    /// Split `documents` now; defer embedding until first use.
    pub fn new(
        documents: Vec<Document>,
        params: ChunkingParams,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let chunks = chunk::split_all(&documents, params.chunk_size, params.chunk_overlap)?;
        tracing::debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "knowledge base split"
        );
        Ok(Self {
            documents,
            chunks,
            embedder,
            batch_size,
            index: OnceCell::new(),
        })
    }

    /// Load the configured knowledge directory plus any extra files.
    ///
    /// Fails with [`HarnessError::NotFound`] if the knowledge directory does
    /// not exist.
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let mut documents =
            loader::load_documents(&config.knowledge_dir(), &config.retrieval.include_globs)?;
        documents.extend(loader::load_extra_files(&config.agent.extra_files));

        Self::new(
            documents,
            ChunkingParams {
                chunk_size: config.chunking.chunk_size,
                chunk_overlap: config.chunking.chunk_overlap,
            },
            embedder,
            config.retrieval.batch_size,
        )
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn is_indexed(&self) -> bool {
        self.index.initialized()
    }

    /// Build the index if it does not exist yet; a no-op otherwise.
    pub async fn build_index(&self) -> Result<&Index> {
        self.index
            .get_or_try_init(|| async {
                tracing::info!(
                    chunks = self.chunks.len(),
                    model = self.embedder.model_name(),
                    "building retrieval index"
                );
                let index = Index::build(&self.chunks, self.embedder.as_ref(), self.batch_size).await?;
                tracing::info!(entries = index.len(), "retrieval index ready");
                Ok::<_, HarnessError>(index)
            })
            .await
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Builds the index on first call. Returns an empty list when `k` is 0
    /// or the corpus is empty, without embedding the query.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let index = self.build_index().await?;
        if k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let hits = index.search(&query_vec, k);
        tracing::debug!(query, k, hits = hits.len(), "retrieval search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;

    /// Maps each text to a fixed vector so scores are predictable.
    struct TableEmbedder;

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "north" | "query" => vec![0.0, 1.0],
                    "north-east" => vec![1.0, 1.0],
                    "east" => vec![1.0, 0.0],
                    _ => vec![0.0, -1.0],
                })
                .collect())
        }
    }

    fn single_chunk_docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(format!("doc{}.md", i), *t))
            .collect()
    }

    fn pipeline(texts: &[&str]) -> RetrievalPipeline {
        RetrievalPipeline::new(
            single_chunk_docs(texts),
            ChunkingParams {
                chunk_size: 100,
                chunk_overlap: 0,
            },
            Arc::new(TableEmbedder),
            2,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let p = pipeline(&["east", "north", "south", "north-east"]);
        let hits = p.search("query", 4).await.unwrap();
        let order: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["north", "north-east", "east", "south"]);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let p = pipeline(&["north", "east", "north", "north"]);
        let hits = p.search("query", 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.source_id.as_str()).collect();
        assert_eq!(ids, vec!["doc0.md", "doc2.md", "doc3.md"]);
    }

    #[tokio::test]
    async fn test_k_bounds() {
        let p = pipeline(&["east", "north"]);
        assert_eq!(p.search("query", 1).await.unwrap().len(), 1);
        assert_eq!(p.search("query", 10).await.unwrap().len(), 2);
        assert!(p.search("query", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_index_is_idempotent() {
        let p = pipeline(&["east", "north", "south"]);
        assert!(!p.is_indexed());
        let first = p.build_index().await.unwrap().len();
        let second = p.build_index().await.unwrap().len();
        assert_eq!(first, 3);
        assert_eq!(first, second);
        assert!(p.is_indexed());
    }

    #[tokio::test]
    async fn test_empty_corpus_searches_empty() {
        let p = RetrievalPipeline::new(
            Vec::new(),
            ChunkingParams {
                chunk_size: 10,
                chunk_overlap: 2,
            },
            Arc::new(HashingEmbedder::new(8)),
            4,
        )
        .unwrap();
        assert!(p.search("anything", 2).await.unwrap().is_empty());
        assert!(p.build_index().await.unwrap().is_empty());
    }

    #[test]
    fn test_bad_chunking_fails_at_construction() {
        let result = RetrievalPipeline::new(
            single_chunk_docs(&["text"]),
            ChunkingParams {
                chunk_size: 10,
                chunk_overlap: 10,
            },
            Arc::new(TableEmbedder),
            1,
        );
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }
}
