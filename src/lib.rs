pub mod cli;
pub mod error;
pub mod logging;
pub mod services;
pub mod utils;

use std::env;
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

pub use cli::Cli;

use error::AppResult;
use services::ai::{LlmService, NodeWithScore, PromptHelper};
use services::index::{IndexRequest, VectorIndex};
use services::parser::LoadOptions;
use services::query::QueryEngine;
use services::RagConfig;

pub async fn run(cli: Cli) -> AppResult<()> {
    logging::init(cli.debug_level);

    let mut config = match cli.config.clone().or_else(RagConfig::default_path) {
        Some(path) => RagConfig::load(&path)?,
        None => RagConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    println!("Response mode chosen: {}", cli.response_mode.description());

    if let Some(dir) = &cli.working_dir {
        env::set_current_dir(dir)?;
    }
    println!("Current working directory: {}", env::current_dir()?.display());

    let start = Instant::now();
    let request = IndexRequest {
        folder: cli.pdf_folder.clone(),
        embedding_path: cli.embedding_path.clone(),
        rebuild: cli.rebuild,
        load_options: LoadOptions {
            pdf_only: cli.pdf_only,
        },
    };
    let index = VectorIndex::build_or_load(&config.vector, &request).await?;
    tracing::debug!(source = ?index.source(), nodes = index.node_count(), "Index ready");
    println!(
        "Time taken for embeddings {:.2} seconds",
        start.elapsed().as_secs_f64()
    );

    let helper = PromptHelper::new(
        config.llm.context_window,
        config.llm.num_output,
        index.embedding().tokenizer().clone(),
    );
    let engine = QueryEngine::new(
        index.retriever(),
        LlmService::new(&config.llm)?,
        helper,
        cli.response_mode,
        config.retrieval.similarity_top_k,
    );

    let question = match &cli.question {
        Some(question) => question.clone(),
        None => prompt_question()?,
    };

    let query_start = Instant::now();
    let mut stdout = io::stdout();
    let response = {
        let mut sink = |delta: &str| -> AppResult<()> {
            stdout.write_all(delta.as_bytes())?;
            stdout.flush()?;
            Ok(())
        };
        engine.query(&question, &mut sink).await?
    };
    println!();

    if !response.source_nodes.is_empty() {
        println!("\nSources:");
        for node in &response.source_nodes {
            println!("  {}", format_source(node));
        }
    }
    println!(
        "Time taken for response: {:.2} minutes",
        minutes(query_start.elapsed())
    );
    println!("Total time: {:.2} minutes", minutes(start.elapsed()));

    Ok(())
}

fn prompt_question() -> AppResult<String> {
    print!("Enter your question: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn format_source(node: &NodeWithScore) -> String {
    match &node.metadata.page_label {
        Some(page) => format!(
            "{} (page {}) score {:.3}",
            node.metadata.file_name, page, node.score
        ),
        None => format!("{} score {:.3}", node.metadata.file_name, node.score),
    }
}

fn minutes(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() / 60.0
}
