//! Response modes: how retrieved chunks are combined into one answer

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::AppError;

pub const UNKNOWN_RESPONSE_MODE: &str = "Unknown response mode";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ResponseMode {
    /// Refine an answer chunk by chunk
    #[value(name = "refine")]
    Refine,
    /// Refine over concatenated chunks
    #[default]
    #[value(name = "compact")]
    Compact,
    /// Summarize bottom-up until one answer remains
    #[value(name = "tree_summarize")]
    TreeSummarize,
    /// Truncate all chunks into one prompt
    #[value(name = "simple_summarize")]
    SimpleSummarize,
    /// Retrieve only, no LLM call
    #[value(name = "no_text")]
    NoText,
    /// One answer per chunk, concatenated
    #[value(name = "accumulate")]
    Accumulate,
    /// Accumulate over concatenated chunks
    #[value(name = "compact_accumulate")]
    CompactAccumulate,
}

impl ResponseMode {
    pub fn all() -> [ResponseMode; 7] {
        [
            ResponseMode::Refine,
            ResponseMode::Compact,
            ResponseMode::TreeSummarize,
            ResponseMode::SimpleSummarize,
            ResponseMode::NoText,
            ResponseMode::Accumulate,
            ResponseMode::CompactAccumulate,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Refine => "refine",
            ResponseMode::Compact => "compact",
            ResponseMode::TreeSummarize => "tree_summarize",
            ResponseMode::SimpleSummarize => "simple_summarize",
            ResponseMode::NoText => "no_text",
            ResponseMode::Accumulate => "accumulate",
            ResponseMode::CompactAccumulate => "compact_accumulate",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ResponseMode::Refine => {
                "create and refine an answer by sequentially going through each retrieved text chunk."
            }
            ResponseMode::Compact => {
                "similar to refine but compact (concatenate) the chunks beforehand, resulting in less LLM calls."
            }
            ResponseMode::TreeSummarize => {
                "Query the LLM using the text_qa_template prompt as many times as needed so that all concatenated chunks have been queried, resulting in as many answers that are themselves recursively used as chunks in a tree_summarize LLM call and so on, until there’s only one chunk left, and thus only one final answer."
            }
            ResponseMode::SimpleSummarize => {
                "Truncates all text chunks to fit into a single LLM prompt. Good for quick summarization purposes, but may lose detail due to truncation."
            }
            ResponseMode::NoText => {
                "Only runs the retriever to fetch the nodes that would have been sent to the LLM, without actually sending them. Then can be inspected by checking response.source_nodes."
            }
            ResponseMode::Accumulate => {
                "Given a set of text chunks and the query, apply the query to each text chunk while accumulating the responses into an array. Returns a concatenated string of all responses. Good for when you need to run the same query separately against each text chunk."
            }
            ResponseMode::CompactAccumulate => {
                "The same as accumulate, but will “compact” each LLM prompt similar to compact, and run the same query against each text chunk."
            }
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResponseMode::all()
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let names = ResponseMode::all()
                    .iter()
                    .map(|mode| mode.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::Validation(format!(
                    "invalid response mode: {s}. Available modes: {names}"
                ))
            })
    }
}

/// Description lookup by name, falling back to a fixed message
pub fn describe(name: &str) -> &'static str {
    name.parse::<ResponseMode>()
        .map(ResponseMode::description)
        .unwrap_or(UNKNOWN_RESPONSE_MODE)
}
