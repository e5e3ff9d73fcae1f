//! Embedding and vector storage
//!
//! Split into submodules:
//! - `model`: EmbeddingService (chunking + fastembed)
//! - `store`: LanceDB storage operations

mod model;
mod store;

pub use model::EmbeddingService;
pub use store::VectorStore;

// Column name constants (shared by model and store)
pub(crate) const COLUMN_DISTANCE: &str = "_distance";

pub(crate) const COLUMN_NODE_ID: &str = "node_id";
pub(crate) const COLUMN_DOC_ID: &str = "doc_id";
pub(crate) const COLUMN_FILE_NAME: &str = "file_name";
pub(crate) const COLUMN_FILE_PATH: &str = "file_path";
pub(crate) const COLUMN_PAGE_LABEL: &str = "page_label";
pub(crate) const COLUMN_CHUNK_INDEX: &str = "chunk_index";
pub(crate) const COLUMN_TOKEN_COUNT: &str = "token_count";
pub(crate) const COLUMN_TEXT_HASH: &str = "text_hash";
pub(crate) const COLUMN_CHUNK_TEXT: &str = "chunk_text";
pub(crate) const COLUMN_VECTOR: &str = "vector";
