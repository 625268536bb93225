use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "sift-bot/0.1 (+https://example.com/bot)";

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seed: String,
    /// Upper bound on allocated page ids, crawled or not.
    pub max_pages: usize,
    /// Per-request timeout; a timed out fetch counts as a failure.
    pub timeout: Duration,
    pub user_agent: String,
    /// Responses larger than this are skipped.
    pub max_page_bytes: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed: String::new(),
            max_pages: 30,
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_page_bytes: 2 * 1024 * 1024,
        }
    }
}
