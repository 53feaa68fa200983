use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use supernote::config::Config;
use supernote::orchestrator::Orchestrator;
use supernote::transport::HttpProvider;

/// Minimal terminal front end for the orchestration layer. All presentation
/// lives here; everything below the Orchestrator is UI-agnostic.
#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for the chat itself
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load());
    let provider = Arc::new(HttpProvider::new(&config.provider, config.retry.clone())?);
    let mut orchestrator = Orchestrator::init(config.clone(), provider).await?;

    println!(
        "SuperNote - crowdsourced class notes assistant ({} / {})",
        config.assistant.name, config.assistant.model
    );
    println!("Ask about the notes, or use /ingest <path>, /files, /quit.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/files" => {
                for file in orchestrator.indexed_files() {
                    println!("{}  {}", file.file_id, file.filename);
                }
            }
            _ if input.starts_with("/ingest ") => {
                let path = input.trim_start_matches("/ingest ").trim();
                match orchestrator.ingest_file(Path::new(path)).await {
                    Ok(file) => println!("Indexed '{}' as {}", file.filename, file.file_id),
                    Err(e) => eprintln!("Ingestion error: {e}"),
                }
            }
            _ => match orchestrator.chat(input).await {
                Ok(reply) => println!("{reply}"),
                Err(e) => eprintln!("Chat error: {e}"),
            },
        }
    }

    Ok(())
}
