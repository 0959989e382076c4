use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobdex_core::persist::{load_meta, IndexPaths};
use jobdex_core::{EngineConfig, Query, RetrievalModel, SearchEngine};
use jobdex_indexer::load_corpus;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect the job-listing search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long, env = "JOBDEX_INDEX", default_value = "./index")]
        output: String,
    },
    /// Print index statistics as JSON
    Stats {
        #[arg(long, env = "JOBDEX_INDEX", default_value = "./index")]
        index: String,
    },
    /// Run a query against an index directory without starting the server
    Query {
        #[arg(long, env = "JOBDEX_INDEX", default_value = "./index")]
        index: String,
        /// Query text
        text: String,
        /// Number of results
        #[arg(short, long, default_value_t = 10)]
        k: i64,
        /// Retrieval model: BM25, TF_IDF or DirichletLM
        #[arg(long, default_value = "BM25")]
        model: String,
        /// Expand the query with pseudo-relevance feedback
        #[arg(short, long, default_value_t = false)]
        expansion: bool,
        /// Engine config JSON (ranking and expansion parameters)
        #[arg(long, env = "JOBDEX_CONFIG")]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_index(&input, &output),
        Commands::Stats { index } => print_stats(&index),
        Commands::Query { index, text, k, model, expansion, config } => {
            run_query(&index, &text, k, &model, expansion, config.as_deref())
        }
    }
}

fn build_index(input: &str, output: &str) -> Result<()> {
    let corpus = load_corpus(Path::new(input))?;
    tracing::info!(num_docs = corpus.len(), "ingested documents");

    let engine = SearchEngine::from_corpus(corpus, EngineConfig::default()).context("building index")?;
    let meta = engine.save(output).with_context(|| format!("writing index to {output}"))?;

    tracing::info!(output, num_docs = meta.num_docs, num_terms = meta.num_terms, "index build complete");
    Ok(())
}

fn print_stats(index: &str) -> Result<()> {
    let meta = load_meta(&IndexPaths::new(index))?;
    let engine = SearchEngine::open(index, EngineConfig::default())?;
    let out = serde_json::json!({
        "created_at": meta.created_at,
        "format_version": meta.version,
        "stats": engine.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_query(index: &str, text: &str, k: i64, model: &str, expansion: bool, config: Option<&str>) -> Result<()> {
    let model: RetrievalModel = model.parse()?;
    let config = match config {
        Some(path) => EngineConfig::from_json_file(path).with_context(|| format!("reading config {path}"))?,
        None => EngineConfig::default(),
    };
    let engine = SearchEngine::open(index, config)?;
    let results = engine.search(&Query::new(text).limit(k).model(model).expansion(expansion))?;
    if results.hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }
    println!("{} of {} hits ({}):", results.hits.len(), results.total_hits, results.model);
    for (rank, hit) in results.hits.iter().enumerate() {
        println!("{:>3}. {:<20} {:>8.4}  {}", rank + 1, hit.id, hit.score, hit.metadata.title);
    }
    Ok(())
}
