use serde::{Deserialize, Serialize};

/// Where a piece of text came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub file_path: String,
    pub page_label: Option<String>,
}

/// One loaded unit of text: a PDF page or a whole text file
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A chunk of a document, the unit that gets embedded and retrieved
#[derive(Debug, Clone)]
pub struct TextNode {
    pub node_id: String,
    pub doc_id: String,
    pub text: String,
    pub chunk_index: i32,
    pub token_count: Option<i32>,
    pub text_hash: String,
    pub metadata: DocumentMetadata,
    pub embedding: Option<Vec<f32>>,
}

/// A retrieved node with its similarity to the query
#[derive(Debug, Clone)]
pub struct NodeWithScore {
    pub node_id: String,
    pub text: String,
    pub chunk_index: i32,
    pub metadata: DocumentMetadata,
    pub score: f64,
}

/// Per-node source info returned alongside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub file_name: String,
    pub page_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationUsage {
    pub prompt_tokens: i64,
    pub output_tokens: i64,
}
