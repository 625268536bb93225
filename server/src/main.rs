use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use sift_core::{IndexStore, StopStem};
use sift_server::build_app_with_store;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sift-server", about = "Serve search over a crawled index")]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Stopword file, one word per line (built-in list if omitted)
    #[arg(long)]
    stopwords: Option<String>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = IndexStore::open(&args.index).with_context(|| format!("opening index at {}", args.index))?;
    let normalizer = match &args.stopwords {
        Some(path) => StopStem::from_file(path).with_context(|| format!("reading stopwords from {path}"))?,
        None => StopStem::new(),
    };
    let pages = store.page_count()?;
    tracing::info!(index = %args.index, pages, "index opened");
    let app: Router = build_app_with_store(store, normalizer);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
