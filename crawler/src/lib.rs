pub mod config;
pub mod crawl;
pub mod fetch;
pub mod report;

pub use config::CrawlConfig;
pub use crawl::{CrawlSummary, Crawler};
pub use fetch::{FetchError, FetchedPage, Fetcher, HttpFetcher, PageStamp};
