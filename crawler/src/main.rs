use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sift_core::{IndexStore, QueryEngine, StopStem};
use sift_crawler::config::DEFAULT_USER_AGENT;
use sift_crawler::report::{format_timestamp, write_report, ReportOptions};
use sift_crawler::{CrawlConfig, Crawler, HttpFetcher};
use std::fs::File;
use std::io::BufWriter;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Crawl a bounded set of pages into an inverted index and search it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl from a seed URL into the index
    Crawl {
        /// Seed URL
        #[arg(long)]
        seed: String,
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: String,
        /// Maximum number of pages to allocate
        #[arg(long, default_value_t = 30)]
        max_pages: usize,
        /// Request timeout seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// User-Agent string
        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        user_agent: String,
        /// Stopword file, one word per line (built-in list if omitted)
        #[arg(long)]
        stopwords: Option<String>,
    },
    /// Write the per-page spider report
    Report {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long, default_value = "spider_result.txt")]
        output: String,
        #[arg(long, default_value_t = 10)]
        max_keywords: usize,
        #[arg(long, default_value_t = 10)]
        max_links: usize,
    },
    /// Run a query against the index, e.g. '"hong kong" university'
    Search {
        query: String,
        #[arg(long, default_value = "./index")]
        index: String,
        /// Number of results to print
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        stopwords: Option<String>,
    },
}

fn normalizer(stopwords: Option<&str>) -> Result<StopStem> {
    match stopwords {
        Some(path) => StopStem::from_file(path).with_context(|| format!("reading stopwords from {path}")),
        None => Ok(StopStem::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl { seed, index, max_pages, timeout_secs, user_agent, stopwords } => {
            let config = CrawlConfig {
                seed,
                max_pages,
                timeout: Duration::from_secs(timeout_secs),
                user_agent,
                ..CrawlConfig::default()
            };
            let store = IndexStore::open(&index).with_context(|| format!("opening index at {index}"))?;
            let fetcher = HttpFetcher::new(&config)?;
            let crawler = Crawler::new(store, fetcher, normalizer(stopwords.as_deref())?, config.max_pages);
            let summary = crawler.run(&config.seed).await?;
            eprintln!(
                "done: visited={} failed={} recrawled={} pages={} -> {}",
                summary.visited, summary.failed, summary.recrawled, summary.allocated, index
            );
        }
        Commands::Report { index, output, max_keywords, max_links } => {
            let store = IndexStore::open(&index).with_context(|| format!("opening index at {index}"))?;
            let mut out = BufWriter::new(File::create(&output)?);
            let n = write_report(&store, &mut out, &ReportOptions { max_keywords, max_links })?;
            tracing::info!(pages = n, output, "report written");
        }
        Commands::Search { query, index, limit, stopwords } => {
            let store = IndexStore::open(&index).with_context(|| format!("opening index at {index}"))?;
            let mut engine = QueryEngine::new(store, normalizer(stopwords.as_deref())?);
            let start = Instant::now();
            let results = engine.search(&query)?;
            println!("Found {} results ({} ms)", results.len(), start.elapsed().as_millis());
            for (i, r) in results.iter().take(limit).enumerate() {
                let title = if r.title.is_empty() { &r.url } else { &r.title };
                println!("{}. {}", i + 1, title);
                println!("   URL: {}", r.url);
                println!("   Score: {:.4}", r.score);
                println!("   Last Modified: {}", format_timestamp(r.last_modified));
                println!("   Size: {} bytes", r.size);
            }
        }
    }
    Ok(())
}
