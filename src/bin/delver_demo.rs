//! Interactive research demo
//!
//! Runs one research turn against live Ollama and Tavily backends and
//! streams the run's progress events to the terminal.
//!
//! # Required environment
//!
//! - `TAVILY_API_KEY`: Tavily search API key
//! - `OLLAMA_API_BASE_URL` (optional, defaults to http://localhost:11434)
//! - `OLLAMA_MODEL` (optional, defaults to llama3.2)
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin delver-demo -- "What are the latest WASI proposals?"
//! cargo run --bin delver-demo -- --effort high --verbose "Compare Tokio and smol"
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use delver::{
    AgentConfig, Effort, EventPayload, OllamaClient, TavilySearch, ThreadManager,
};

/// Research demo CLI
#[derive(Parser, Debug)]
#[command(
    name = "delver-demo",
    version,
    about = "Iterative web-research agent: ask a question, watch the research loop, get a cited answer"
)]
struct Args {
    /// The question to research
    #[arg(value_name = "QUERY")]
    query: String,

    /// Research effort level (bounds loop count and queries per round)
    #[arg(short, long, default_value = "medium")]
    effort: Effort,

    /// Ollama model to use
    #[arg(short, long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut llm = OllamaClient::from_env();
    if let Some(model) = &args.model {
        llm = OllamaClient::new(
            std::env::var("OLLAMA_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model.as_str(),
        );
    }
    let search = TavilySearch::from_env()
        .context("TAVILY_API_KEY environment variable not set")?;

    info!(effort = args.effort.as_str(), "Starting research");

    let manager = ThreadManager::new(Arc::new(llm), Arc::new(search), AgentConfig::default());
    let mut events = manager.submit("demo", &args.query, args.effort).await;

    println!();
    println!("{}", style(format!("Researching: {}", args.query)).cyan().bold());
    println!();

    while let Some(event) = events.recv().await {
        match event.payload {
            EventPayload::QueriesGenerated { queries } => {
                println!("{}", style("Search queries").white().bold());
                for query in queries {
                    println!("  - {}", query);
                }
            }
            EventPayload::SourcesGathered {
                new_sources,
                total_sources,
                failed_queries,
            } => {
                println!(
                    "{} {} new, {} total{}",
                    style("Sources").white().bold(),
                    new_sources,
                    total_sources,
                    if failed_queries > 0 {
                        format!(" ({} queries failed)", failed_queries)
                    } else {
                        String::new()
                    }
                );
            }
            EventPayload::Reflection {
                sufficient,
                follow_up_queries,
                loop_count,
            } => {
                if sufficient {
                    println!(
                        "{} sufficient after loop {}",
                        style("Reflection").white().bold(),
                        loop_count
                    );
                } else {
                    println!(
                        "{} loop {}: digging deeper into {} follow-ups",
                        style("Reflection").white().bold(),
                        loop_count,
                        follow_up_queries.len()
                    );
                }
            }
            EventPayload::Completed { final_answer } => {
                println!();
                println!("{}", style("Answer").green().bold());
                println!("{}", final_answer);
            }
            EventPayload::Failed { kind, message } => {
                eprintln!();
                eprintln!("{} [{}] {}", style("Research failed").red().bold(), kind, message);
                std::process::exit(1);
            }
            EventPayload::Cancelled => {
                println!();
                println!("{}", style("Run cancelled").yellow().bold());
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;
    Ok(())
}
