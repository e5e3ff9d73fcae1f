mod embedding;
mod llm;
mod prompts;
mod response_mode;
mod search;
mod synthesizer;
mod types;

pub use embedding::{EmbeddingService, VectorStore};
pub use llm::{DeltaSink, LanguageModel, LlmService, NdjsonDecoder};
pub use prompts::{PromptHelper, PromptTemplate, REFINE, TEXT_QA, TREE_SUMMARIZE};
pub use response_mode::{describe, ResponseMode, UNKNOWN_RESPONSE_MODE};
pub use search::{Retriever, SearchService};
pub use synthesizer::{Synthesizer, ACCUMULATE_SEPARATOR, EMPTY_RESPONSE};
pub use types::*;

#[cfg(test)]
pub(crate) use synthesizer::tests::ScriptedModel;
