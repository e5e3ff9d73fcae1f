//! EmbeddingService - chunking and embedding

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use text_splitter::{ChunkConfig, MarkdownSplitter};
use tokenizers::Tokenizer;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ResultExt};
use crate::services::ai::{Document, TextNode};
use crate::services::VectorConfig;
use crate::utils::short_hash;

/// A supported fastembed model, looked up by name
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub model: EmbeddingModel,
    pub model_code: String,
    pub dim: usize,
}

/// Match `name` against fastembed's model codes (`Xenova/bge-small-en-v1.5`),
/// then against variant names (`BGESmallENV15`)
pub fn resolve_embedding_model(name: &str) -> AppResult<ResolvedModel> {
    let name = name.trim();
    let supported = TextEmbedding::list_supported_models();
    supported
        .iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(name))
        .or_else(|| {
            supported
                .iter()
                .find(|info| format!("{:?}", info.model).eq_ignore_ascii_case(name))
        })
        .map(|info| ResolvedModel {
            model: info.model.clone(),
            model_code: info.model_code.clone(),
            dim: info.dim,
        })
        .ok_or_else(|| AppError::Config(format!("unknown embedding model {name}")))
}

pub struct EmbeddingService {
    dense: Mutex<TextEmbedding>,
    tokenizer: Tokenizer,
    splitter: MarkdownSplitter<Tokenizer>,
    config: VectorConfig,
}

impl EmbeddingService {
    pub fn new(config: VectorConfig) -> AppResult<Self> {
        let resolved = resolve_embedding_model(&config.embedding_model)?;
        if resolved.dim as u64 != config.vector_size {
            return Err(AppError::Config(format!(
                "embedding model {} produces {} dimensions but vector_size is {}",
                resolved.model_code, resolved.dim, config.vector_size
            )));
        }

        let mut options = TextInitOptions::new(resolved.model);
        if let Some(cache_dir) = config.model_cache_dir.as_deref() {
            options = options.with_cache_dir(cache_dir.into());
        }
        let dense = TextEmbedding::try_new(options).ai_err("load embedding model")?;

        let tokenizer = Tokenizer::from_pretrained(&resolved.model_code, None)
            .ai_err("load tokenizer")?;

        // pdf pages come out of the parser as markdown
        let chunk_config = ChunkConfig::new(config.chunk_size)
            .with_overlap(config.chunk_overlap)
            .config_err("invalid chunk config")?
            .with_sizer(tokenizer.clone());
        let splitter = MarkdownSplitter::new(chunk_config);

        tracing::info!(model = %resolved.model_code, "Embedding model ready");

        Ok(Self {
            dense: Mutex::new(dense),
            tokenizer,
            splitter,
            config,
        })
    }

    /// Tokenizer of the embedding model, also used to size prompts
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<TextNode> {
        let mut nodes = Vec::new();
        for document in documents {
            let text = document.text.trim();
            if text.is_empty() {
                continue;
            }
            for (idx, chunk) in self.splitter.chunks(text).enumerate() {
                nodes.push(TextNode {
                    node_id: Uuid::new_v4().to_string(),
                    doc_id: document.doc_id.clone(),
                    text: chunk.to_string(),
                    chunk_index: idx as i32,
                    token_count: self.token_count(chunk),
                    text_hash: short_hash(chunk),
                    metadata: document.metadata.clone(),
                    embedding: None,
                });
            }
        }
        tracing::debug!(documents = documents.len(), nodes = nodes.len(), "Chunked documents");
        nodes
    }

    pub async fn embed_nodes(&self, nodes: &mut [TextNode]) -> AppResult<()> {
        let expected = self.config.vector_size as usize;

        for batch in nodes.chunks_mut(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|node| node.text.as_str()).collect();
            let vectors = {
                let mut model = self.dense.lock().await;
                model.embed(texts.as_slice(), None)
            }
            .ai_err("embedding failed")?;

            if vectors.len() != batch.len() {
                return Err(AppError::AiService("embedding result count mismatch".to_string()));
            }

            for (node, vector) in batch.iter_mut().zip(vectors) {
                if vector.len() != expected {
                    return Err(AppError::AiService(format!(
                        "embedding size {} does not match vector_size {}",
                        vector.len(),
                        expected
                    )));
                }
                node.embedding = Some(vector);
            }
            tracing::debug!(batch = batch.len(), "Embedded batch");
        }

        Ok(())
    }

    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("query text is empty".to_string()));
        }

        let vectors = {
            let mut model = self.dense.lock().await;
            model.embed(vec![text], None)
        }
        .ai_err("query embedding failed")?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::AiService("query embedding missing".to_string()))
    }

    pub fn token_count(&self, text: &str) -> Option<i32> {
        self.tokenizer
            .encode(text, false)
            .ok()
            .map(|encoding| encoding.len() as i32)
    }
}
