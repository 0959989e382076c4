use anyhow::Result;
use axum::Router;
use clap::Parser;
use jobdex_core::{EngineConfig, RankingParams, RetrievalModel};
use jobdex_server::{build_app, AppConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "server", about = "HTTP API for the job-listing search engine")]
struct Args {
    /// Index directory path
    #[arg(long, env = "JOBDEX_INDEX", default_value = "./index")]
    index: PathBuf,
    /// Host to bind
    #[arg(long, env = "JOBDEX_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "JOBDEX_PORT", default_value_t = 8000)]
    port: u16,
    /// Token required by the mutating endpoints
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
    /// Comma-separated CORS origins (any origin when unset)
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
    /// Engine config JSON; the flags below override it
    #[arg(long, env = "JOBDEX_CONFIG")]
    config: Option<PathBuf>,
    /// Default retrieval model: BM25, TF_IDF or DirichletLM
    #[arg(long, env = "JOBDEX_MODEL")]
    model: Option<String>,
    /// Per-query time budget in milliseconds (0 disables it)
    #[arg(long, env = "JOBDEX_QUERY_TIMEOUT_MS")]
    query_timeout_ms: Option<u64>,
    #[arg(long, env = "JOBDEX_BM25_K1")]
    k1: Option<f64>,
    #[arg(long, env = "JOBDEX_BM25_B")]
    b: Option<f64>,
    /// Dirichlet smoothing parameter
    #[arg(long, env = "JOBDEX_LM_MU")]
    mu: Option<f64>,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(model) = &self.model {
            config.default_model = model.parse::<RetrievalModel>()?;
        }
        if let Some(ms) = self.query_timeout_ms {
            config.query_timeout_ms = if ms == 0 { None } else { Some(ms) };
        }
        let RankingParams { k1, b, mu } = config.ranking;
        config.ranking = RankingParams { k1: self.k1.unwrap_or(k1), b: self.b.unwrap_or(b), mu: self.mu.unwrap_or(mu) };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let engine = args.engine_config()?;
    tracing::debug!(?engine, "engine config");
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let app: Router = build_app(AppConfig {
        index_dir: args.index,
        admin_token: args.admin_token,
        cors_allow_origin: args.cors_allow_origin,
        engine,
    })?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
    }
    tracing::info!("shutting down");
}
