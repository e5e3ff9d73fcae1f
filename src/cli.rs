use std::path::PathBuf;

use clap::Parser;

use crate::logging::DebugLevel;
use crate::services::ai::ResponseMode;
use crate::services::RagConfig;

#[derive(Debug, Parser)]
#[command(
    name = "pdfquery",
    version,
    about = "Ask questions over a folder of PDFs with a local LLM"
)]
pub struct Cli {
    /// Folder with the documents to index
    #[arg(long, default_value = "./source")]
    pub pdf_folder: PathBuf,

    /// Model name served by the local runtime
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the local runtime
    #[arg(long)]
    pub llm_url: Option<String>,

    #[arg(long, value_enum, default_value_t = ResponseMode::Compact)]
    pub response_mode: ResponseMode,

    /// Load the index from here if it exists, otherwise persist a new one here
    #[arg(long)]
    pub embedding_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DebugLevel::NotSet)]
    pub debug_level: DebugLevel,

    /// JSON config file [default: config.json in the platform config dir]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ask this question instead of prompting on stdin
    #[arg(long)]
    pub question: Option<String>,

    /// Change into this directory before resolving relative paths
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Re-embed the documents even if a persisted index exists
    #[arg(long)]
    pub rebuild: bool,

    /// Only load *.pdf files
    #[arg(long)]
    pub pdf_only: bool,

    /// Number of chunks retrieved per question
    #[arg(long)]
    pub top_k: Option<usize>,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut RagConfig) {
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(url) = &self.llm_url {
            config.llm.base_url = url.clone();
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.similarity_top_k = top_k;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_script() {
        let cli = Cli::try_parse_from(["pdfquery"]).unwrap();
        assert_eq!(cli.pdf_folder, PathBuf::from("./source"));
        assert_eq!(cli.response_mode, ResponseMode::Compact);
        assert_eq!(cli.debug_level, DebugLevel::NotSet);
        assert!(cli.embedding_path.is_none());
        assert!(!cli.rebuild);
    }

    #[test]
    fn parses_every_flag() {
        let cli = Cli::try_parse_from([
            "pdfquery",
            "--pdf-folder",
            "docs",
            "--model",
            "mistral",
            "--llm-url",
            "http://gpu:11434",
            "--response-mode",
            "tree_summarize",
            "--embedding-path",
            "emb",
            "--debug-level",
            "Warning",
            "--question",
            "What is it?",
            "--rebuild",
            "--pdf-only",
            "--top-k",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.response_mode, ResponseMode::TreeSummarize);
        assert_eq!(cli.debug_level, DebugLevel::Warning);
        assert_eq!(cli.embedding_path, Some(PathBuf::from("emb")));
        assert_eq!(cli.question.as_deref(), Some("What is it?"));
        assert!(cli.rebuild && cli.pdf_only);
    }

    #[test]
    fn rejects_unknown_choices() {
        assert!(Cli::try_parse_from(["pdfquery", "--response-mode", "fast"]).is_err());
        assert!(Cli::try_parse_from(["pdfquery", "--debug-level", "Verbose"]).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from(["pdfquery", "--model", "mistral", "--top-k", "5"]).unwrap();
        let mut config = RagConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.retrieval.similarity_top_k, 5);
        assert_eq!(config.llm.base_url, RagConfig::default().llm.base_url);
    }
}
