use std::process::ExitCode;

use clap::Parser;

use pdfquery_lib::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match pdfquery_lib::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
