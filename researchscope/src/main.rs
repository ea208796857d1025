/*
researchscope - command-line research aggregator.
Runs one query given on the command line, or reads queries from stdin in a loop
so that the research memory carries over between them.
*/

use anyhow::Result;
use clap::Parser;
use common::Config;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use researchscope::aggregator::{ResearchAggregator, ResearchOutcome};
use researchscope::error::ResearchError;
use researchscope::models::ResearchRun;

#[derive(Parser, Debug)]
#[command(name = "researchscope", about = "Fetch, summarize and synthesize web sources on a topic")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of search results to fetch per query
    #[arg(long, value_name = "N")]
    sources: Option<usize>,

    /// Print the research memory as JSON before exiting
    #[arg(long)]
    history: bool,

    /// After the query, search this run's summaries for TEXT
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,

    /// Research topic; omit to enter queries interactively
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config.clone()).await?;

    let mut aggregator = match ResearchAggregator::from_config(&config).await {
        Ok(agg) => agg,
        Err(e) => {
            error!("failed to initialize research pipeline: {:#}", e);
            eprintln!("Cannot start: {:#}", e);
            return Err(e);
        }
    };
    if let Some(n) = args.sources {
        aggregator = aggregator.with_num_sources(n);
    }

    match &args.query {
        Some(query) => {
            if !run_query(&mut aggregator, query).await {
                std::process::exit(1);
            }
        }
        None => interactive(&mut aggregator).await?,
    }

    if let Some(text) = &args.search {
        match aggregator.semantic_search(text, 5).await {
            Ok(hits) if hits.is_empty() => println!("\nNo indexed summaries match {:?}.", text),
            Ok(hits) => {
                println!("\nClosest summaries to {:?}:", text);
                for (i, hit) in hits.iter().enumerate() {
                    println!("{}. {}", i + 1, hit);
                }
            }
            Err(e) => eprintln!("Semantic search failed: {:#}", e),
        }
    }

    if args.history {
        println!("{}", serde_json::to_string_pretty(&aggregator.history())?);
    }

    Ok(())
}

/// Resolve `config.default.toml` plus an optional override file.
async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = match Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(%e, "failed to load configuration");
            return Err(e);
        }
    };
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

async fn interactive(aggregator: &mut ResearchAggregator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nEnter a research topic (or 'quit' to exit): ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if !run_query(aggregator, query).await {
            break;
        }
    }
    Ok(())
}

/// Run and print one query. Returns false when the failure is fatal and
/// further queries would fail the same way.
async fn run_query(aggregator: &mut ResearchAggregator, query: &str) -> bool {
    match aggregator.research_topic(query).await {
        Ok(ResearchOutcome::Completed { run, path, fetch_report }) => {
            print_run(&run);
            let failed = fetch_report.failures().count();
            if failed > 0 {
                println!("\n({} source(s) could not be fetched)", failed);
            }
            println!("\nResults saved to {}", path.display());
            true
        }
        Ok(ResearchOutcome::NoResults { reason }) => {
            println!("\nNo results: {}", reason);
            true
        }
        Err(e) => {
            error!("research failed: {:#}", e);
            eprintln!("\nResearch aborted: {:#}", e);
            !ResearchError::is_fatal_error(&e)
        }
    }
}

fn print_run(run: &ResearchRun) {
    let analysis = &run.combined_analysis;

    println!("\n{}", "=".repeat(60));
    println!("Research: {}", run.query);
    println!("{}", "=".repeat(60));

    println!("\nSummary:\n{}", analysis.comprehensive_summary);

    if !analysis.key_themes.is_empty() {
        println!("\nKey themes:");
        for theme in &analysis.key_themes {
            println!("  - {}", theme);
        }
    }

    if !analysis.topics.is_empty() {
        println!("\nTopics:");
        for topic in &analysis.topics {
            println!("  {}. {}", topic.id + 1, topic.words.join(", "));
        }
    }

    println!(
        "\nOverall sentiment: {} ({:.2})",
        analysis.overall_sentiment.label, analysis.overall_sentiment.score
    );

    println!("\nSources ({}):", analysis.source_count);
    for (i, source) in run.source_articles.iter().enumerate() {
        println!("{}. {}", i + 1, source.title);
        println!("   {}", source.url);
    }
}
