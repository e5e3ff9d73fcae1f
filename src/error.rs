//! Unified error type
//!
//! `AppError` is built with `thiserror`; `AppResult` is the crate-wide alias.

use thiserror::Error;

/// Application-level error
#[derive(Debug, Error)]
pub enum AppError {
    /// File system error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("invalid input: {0}")]
    Validation(String),

    /// Missing file or folder
    #[error("not found: {entity} ({path})")]
    NotFound { entity: &'static str, path: String },

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Embedding model or LLM runtime error
    #[error("ai service error: {0}")]
    AiService(String),

    /// Vector store error
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Document parsing error
    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Business(String),
}

// ========== From: String and &str ==========

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Business(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Business(s.to_string())
    }
}

impl AppError {
    /// Short machine-readable kind, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "io",
            AppError::Json(_) => "json",
            AppError::Validation(_) => "validation",
            AppError::NotFound { .. } => "not_found",
            AppError::Config(_) => "config",
            AppError::AiService(_) => "ai_service",
            AppError::VectorStore(_) => "vector_store",
            AppError::Parse(_) => "parse",
            AppError::Business(_) => "business",
        }
    }
}

/// Application-level result alias
pub type AppResult<T> = Result<T, AppError>;

// ========== Context helpers for foreign errors ==========

pub trait ResultExt<T> {
    fn validation_err(self, msg: &str) -> AppResult<T>;

    fn config_err(self, msg: &str) -> AppResult<T>;

    fn ai_err(self, msg: &str) -> AppResult<T>;

    fn store_err(self, msg: &str) -> AppResult<T>;

    fn parse_err(self, msg: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn validation_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Validation(format!("{}: {}", msg, e)))
    }

    fn config_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Config(format!("{}: {}", msg, e)))
    }

    fn ai_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::AiService(format!("{}: {}", msg, e)))
    }

    fn store_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::VectorStore(format!("{}: {}", msg, e)))
    }

    fn parse_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Parse(format!("{}: {}", msg, e)))
    }
}
