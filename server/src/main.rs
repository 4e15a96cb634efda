use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::build_app;
use stackrank_core::RankerConfig;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory
    #[arg(long, default_value = "./stackrank.db")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// JSON file with ranker settings
    #[arg(long)]
    config: Option<String>,
    /// BM25 term-frequency saturation (overrides the config file)
    #[arg(long)]
    k1: Option<f64>,
    /// BM25 length normalization (overrides the config file)
    #[arg(long)]
    b: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RankerConfig::from_json_file(path)?,
        None => RankerConfig::default(),
    };
    if let Some(k1) = args.k1 { config.k1 = k1; }
    if let Some(b) = args.b { config.b = b; }

    let app: Router = build_app(args.db.clone(), config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, db = %args.db, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
