//! RAG configuration
//!
//! Plain JSON on disk; every field has a default so a partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ResultExt};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub context_window: usize,
    pub num_output: usize,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama2:7b-chat".to_string(),
            temperature: 0.1,
            context_window: 3900,
            num_output: 256,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub embedding_model: String,
    pub vector_size: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
    pub table_name: String,
    pub model_cache_dir: Option<String>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            embedding_model: "Xenova/bge-small-en-v1.5".to_string(),
            vector_size: 384,
            chunk_size: 512,
            chunk_overlap: 20,
            embed_batch_size: 32,
            table_name: "nodes".to_string(),
            model_cache_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { similarity_top_k: 2 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
}

impl RagConfig {
    /// `config.json` under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pdfquery").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load config (missing file means defaults)
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let bytes = fs::read(path)?;
        let config: RagConfig = serde_json::from_slice(&bytes)
            .config_err(&format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        let vector = &self.vector;
        if vector.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }
        if vector.chunk_overlap >= vector.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                vector.chunk_overlap, vector.chunk_size
            )));
        }
        if vector.vector_size == 0 {
            return Err(AppError::Config("vector_size must be positive".to_string()));
        }
        if vector.embed_batch_size == 0 {
            return Err(AppError::Config("embed_batch_size must be positive".to_string()));
        }
        if self.retrieval.similarity_top_k == 0 {
            return Err(AppError::Config("similarity_top_k must be positive".to_string()));
        }
        if self.llm.num_output >= self.llm.context_window {
            return Err(AppError::Config(format!(
                "num_output ({}) must be smaller than context_window ({})",
                self.llm.num_output, self.llm.context_window
            )));
        }
        Ok(())
    }
}
