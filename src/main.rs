//! # promovec CLI
//!
//! Command-line interface for the promotion-analytics embedding pipeline:
//!
//! - `generate`: embed every source row into the durable output file,
//!   resuming from where a previous run stopped
//! - `load`: join base records with embeddings and bulk-load the store
//! - `run`: generate then load, end to end
//! - `search`: cosine-similarity search over the loaded vectors
//!
//! Configuration comes from the environment (see `promovec::config`);
//! paths are given as arguments. The process exits zero only on full
//! completion.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use promovec::config::{EMBEDDING_DIMENSIONS, PipelineConfig};
use promovec::embedder::{EmbeddingClient, OpenAiClient};
use promovec::generator::{CheckpointStore, Generator, OutputFile};
use promovec::loader;
use promovec::scheduler::RateScheduler;
use promovec::store::Database;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Embedding ingestion pipeline for promotion analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate embeddings for the unified dataset (resumable)
    Generate(GenerateArgs),

    /// Bulk-load joined records and embeddings into the store
    Load(LoadArgs),

    /// Generate embeddings, then bulk-load the store
    Run(RunArgs),

    /// Similarity search over the loaded promo-product vectors
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Unified promo-product CSV to embed
    #[arg(required = true)]
    source: PathBuf,

    /// Embedding output file
    #[arg(short, long, default_value = "embeddings.csv")]
    output: PathBuf,

    /// Checkpoint file
    #[arg(long, default_value = "checkpoint.json")]
    checkpoint: PathBuf,

    /// Discard prior output and start from scratch
    #[arg(long)]
    fresh: bool,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Unified promo-product CSV (base-record source)
    #[arg(required = true)]
    source: PathBuf,

    /// Embedding output file produced by `generate`
    #[arg(short, long, default_value = "embeddings.csv")]
    embeddings: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Unified promo-product CSV
    #[arg(required = true)]
    source: PathBuf,

    /// Embedding output file
    #[arg(short, long, default_value = "embeddings.csv")]
    output: PathBuf,

    /// Checkpoint file
    #[arg(long, default_value = "checkpoint.json")]
    checkpoint: PathBuf,

    /// Discard prior output and start from scratch
    #[arg(long)]
    fresh: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Query text
    #[arg(required = true)]
    query: String,

    /// Maximum number of results
    #[arg(short, long, default_value = "5")]
    limit: usize,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Some(Commands::Generate(args)) => {
            generate_command(&config, args).await?;
        }
        Some(Commands::Load(args)) => {
            load_command(&config, args).await?;
        }
        Some(Commands::Run(args)) => {
            let load_args = LoadArgs {
                source: args.source.clone(),
                embeddings: args.output.clone(),
            };
            generate_command(
                &config,
                GenerateArgs {
                    source: args.source,
                    output: args.output,
                    checkpoint: args.checkpoint,
                    fresh: args.fresh,
                },
            )
            .await?;
            load_command(&config, load_args).await?;
        }
        Some(Commands::Search(args)) => {
            search_command(&config, args).await?;
        }
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["--help"]);
        }
    }

    Ok(())
}

fn build_client(config: &PipelineConfig) -> anyhow::Result<OpenAiClient> {
    Ok(OpenAiClient::new(
        &config.api_base,
        config.require_api_key()?,
        &config.model,
        EMBEDDING_DIMENSIONS,
        config.max_retries,
    ))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .expect("valid spinner template"),
    );
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar.set_message(message.to_string());
    bar
}

async fn generate_command(config: &PipelineConfig, args: GenerateArgs) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let scheduler = Arc::new(RateScheduler::new(
        config.requests_per_window,
        config.tokens_per_window,
        config.concurrency,
        config.window,
    ));
    let generator = Generator::new(
        client,
        scheduler,
        config.batch_size,
        config.concurrency,
        config.flush_every,
        config.progress_every,
    );

    let output = OutputFile::new(&args.output);
    let checkpoint = CheckpointStore::new(&args.checkpoint);

    if args.fresh {
        output.remove()?;
        checkpoint.clear().await?;
    }

    let bar = spinner("Generating embeddings...");
    let summary = generator.run(&args.source, &output, &checkpoint).await?;
    bar.finish_with_message("Generation complete");

    println!(
        "Embedded {} of {} rows (resumed from {}) in {:.1}s ({:.1} rows/s)",
        summary.rows_embedded,
        summary.total_inputs,
        summary.resumed_from,
        summary.duration.as_secs_f64(),
        summary.rows_per_sec()
    );
    Ok(())
}

async fn load_command(config: &PipelineConfig, args: LoadArgs) -> anyhow::Result<()> {
    let db = Database::new_from_path(&config.db_path, EMBEDDING_DIMENSIONS).await?;

    let bar = spinner("Loading joined rows into the store...");
    let summary = loader::run_load(&db, &args.source, &args.embeddings).await?;
    bar.finish_with_message("Load complete");

    println!(
        "Inserted {} rows ({} skipped of {} source rows) in {:.1}s ({:.0} rows/s); store reports {} rows",
        summary.inserted,
        summary.skipped,
        summary.source_rows,
        summary.duration.as_secs_f64(),
        summary.rows_per_sec(),
        summary.verified_count
    );
    Ok(())
}

async fn search_command(config: &PipelineConfig, args: SearchArgs) -> anyhow::Result<()> {
    let db = Database::new_from_path(&config.db_path, EMBEDDING_DIMENSIONS).await?;
    let client = build_client(config)?;

    let mut vectors = client.embed(&[args.query.clone()]).await?;
    let query_vector = vectors
        .pop()
        .ok_or_else(|| anyhow::anyhow!("embedding API returned no vector for the query"))?;

    let results = db.search_similar(&query_vector, args.limit).await?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        _ => {
            println!("Found {} results for: {}", results.len(), args.query);
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. {} - {} ({}, {} via {})",
                    i + 1,
                    result.promo_name,
                    result.product_name,
                    result.category,
                    result.season_label,
                    result.channel
                );
                println!(
                    "   discount: {:.1}%  distance: {:.4}",
                    result.discount_percent, result.distance
                );
                println!();
            }
        }
    }
    Ok(())
}
