use std::sync::Arc;

use crate::error::AppResult;

use super::embedding::{EmbeddingService, VectorStore};
use super::types::NodeWithScore;

/// Finds the nodes most similar to a query
#[allow(async_fn_in_trait)]
pub trait Retriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> AppResult<Vec<NodeWithScore>>;
}

pub struct SearchService {
    embedding: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
}

impl SearchService {
    pub fn new(embedding: Arc<EmbeddingService>, store: Arc<VectorStore>) -> Self {
        Self { embedding, store }
    }
}

impl Retriever for SearchService {
    async fn retrieve(&self, query: &str, top_k: usize) -> AppResult<Vec<NodeWithScore>> {
        let vector = self.embedding.embed_query(query).await?;
        let results = self.store.search(vector, top_k).await?;
        tracing::debug!(top_k, found = results.len(), "Retrieved nodes");
        Ok(results)
    }
}
