//! RAG Eval CLI
//!
//! Evaluates a LightRAG-compatible engine against a labeled question set.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rag_eval::{
    config::Config,
    ingest::IngestionOrchestrator,
    llm::LlmClient,
    metrics::LlmJudgeScorer,
    pipeline::EvalPipeline,
    rag::RagClient,
    report::load_report,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// RAG Eval - accuracy and citation evaluation for RAG engines
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full evaluation pipeline
    Run(RunArgs),

    /// Ingest a directory of documents into the engine
    Ingest {
        /// Directory containing the documents to upload
        dir: PathBuf,
    },

    /// Print the summary of a saved report
    Show {
        /// Path to an eval_results_*.json report
        report: PathBuf,
    },

    /// Test the connection to the RAG engine
    Test,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the JSONL dataset
    #[arg(short, long, default_value = "EVAL.jsonl")]
    dataset: PathBuf,

    /// Directory of documents to ingest before querying
    #[arg(long)]
    docs: Option<PathBuf>,

    /// Evaluate against the engine's existing corpus
    #[arg(long)]
    skip_ingestion: bool,

    /// Maximum number of queries in flight
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Directory that receives the report files
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also compute model-graded semantic metrics
    #[arg(long)]
    semantic: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run(args) => cmd_run(config, args).await,
        Commands::Ingest { dir } => cmd_ingest(config, dir).await,
        Commands::Show { report } => cmd_show(report),
        Commands::Test => cmd_test(config).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Config::load().context("Failed to load configuration"),
    }
}

async fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    if let Some(docs) = args.docs {
        config.eval.input_dir = docs;
    }
    if args.skip_ingestion {
        config.eval.skip_ingestion = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.eval.max_concurrent = concurrency;
    }
    if let Some(output_dir) = args.output_dir {
        config.eval.results_dir = output_dir;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        engine = %config.rag.api_base,
        mode = %config.rag.mode,
        top_k = config.rag.top_k,
        concurrency = config.eval.max_concurrent,
        "starting evaluation"
    );

    let client = Arc::new(RagClient::new(config.rag.clone()).context("Failed to create RAG client")?);

    let summary = if args.semantic {
        config
            .validate_judge()
            .context("Semantic metrics need a judge LLM")?;
        let judge = LlmClient::new(config.judge.clone()).context("Failed to create judge client")?;
        info!(model = judge.model(), "semantic metrics enabled");
        let scorer = LlmJudgeScorer::new(judge);

        EvalPipeline::new(config, client)
            .run_with_metrics(&args.dataset, &scorer)
            .await
            .context("Evaluation failed")?
    } else {
        EvalPipeline::new(config, client)
            .run(&args.dataset)
            .await
            .context("Evaluation failed")?
    };

    summary.report.print_summary();
    println!("Results saved to:");
    println!("  {}", summary.saved.json_path.display());
    println!("  {}", summary.saved.html_path.display());

    Ok(())
}

async fn cmd_ingest(config: Config, dir: PathBuf) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let client = Arc::new(RagClient::new(config.rag).context("Failed to create RAG client")?);
    let orchestrator = IngestionOrchestrator::new(client);

    let summary = orchestrator
        .ingest_directory(&dir)
        .await
        .with_context(|| format!("Failed to ingest '{}'", dir.display()))?;

    println!("Ingestion Summary");
    println!("{}", "─".repeat(40));
    println!("  Total:       {}", summary.total());
    println!("  Successful:  {}", summary.successful());
    println!("  Failed:      {}", summary.failed());
    for record in summary.records.iter().filter(|r| !r.is_success()) {
        println!(
            "    {}: {}",
            record.file_path.display(),
            record.error.as_deref().unwrap_or("unknown error")
        );
    }

    summary.ensure_usable().context("Ingestion failed")?;
    Ok(())
}

fn cmd_show(report_path: PathBuf) -> Result<()> {
    let report = load_report(&report_path)
        .with_context(|| format!("Failed to load report '{}'", report_path.display()))?;
    report.print_summary();
    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing RAG engine connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.rag.api_base);
    println!("  Mode:      {}", config.rag.mode);
    if config.rag.api_key.is_empty() {
        println!("  API Key:   (none)");
    } else {
        let prefix: String = config.rag.api_key.chars().take(4).collect();
        println!("  API Key:   {}...", prefix);
    }
    println!();

    config.validate().context("Invalid configuration")?;

    let client = RagClient::new(config.rag).context("Failed to create RAG client")?;

    println!("Sending test query...");
    client
        .test_connection()
        .await
        .context("Connection failed")?;
    println!("Connection successful!");

    Ok(())
}
