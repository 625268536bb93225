use crate::config::CrawlConfig;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use thiserror::Error;
use time::macros::format_description;
use time::PrimitiveDateTime;
use url::Url;

/// What the crawler needs from one downloaded page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub title: String,
    pub body_text: String,
    /// Text of `<head>`; indexed as the title field.
    pub head_text: String,
    /// Absolute http(s) URLs without fragments, deduplicated, in document order.
    pub links: Vec<String>,
    /// Epoch millis from `Last-Modified`, 0 when absent.
    pub last_modified: i64,
    pub size: u64,
}

/// Metadata observed without downloading the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStamp {
    pub last_modified: i64,
    pub size: u64,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("not an html page ({0})")]
    NotHtml(String),
    #[error("page too large ({0} bytes)")]
    TooLarge(usize),
    #[error("{0}")]
    Unavailable(String),
}

#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
    async fn probe(&self, url: &str) -> Result<PageStamp, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    max_page_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, max_page_bytes: config.max_page_bytes })
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let base = parse_url(url)?;
        let resp = self.client.get(base.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }
        if let Some(ct) = resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if !ct.starts_with("text/html") {
                return Err(FetchError::NotHtml(ct.to_string()));
            }
        }
        let stamp = stamp_from_headers(resp.headers());
        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_page_bytes {
            return Err(FetchError::TooLarge(bytes.len()));
        }

        let mut page = parse_html(&String::from_utf8_lossy(&bytes), &base);
        page.last_modified = stamp.last_modified;
        page.size = if stamp.size > 0 { stamp.size } else { bytes.len() as u64 };
        Ok(page)
    }

    async fn probe(&self, url: &str) -> Result<PageStamp, FetchError> {
        let resp = self.client.head(parse_url(url)?).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }
        Ok(stamp_from_headers(resp.headers()))
    }
}

fn stamp_from_headers(headers: &HeaderMap) -> PageStamp {
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .unwrap_or(0);
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    PageStamp { last_modified, size }
}

/// Parse an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`) into epoch millis.
pub fn parse_http_date(value: &str) -> Option<i64> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let parsed = PrimitiveDateTime::parse(value.trim(), &format).ok()?;
    Some((parsed.assume_utc().unix_timestamp_nanos() / 1_000_000) as i64)
}

fn element_text(doc: &Html, selector: &Selector) -> String {
    doc.select(selector)
        .next()
        .map(|n| n.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Extract title, body text, head text and resolved outbound links.
pub fn parse_html(html: &str, base: &Url) -> FetchedPage {
    let sel_title = Selector::parse("title").expect("valid selector");
    let sel_head = Selector::parse("head").expect("valid selector");
    let sel_body = Selector::parse("body").expect("valid selector");
    let sel_a = Selector::parse("a[href]").expect("valid selector");

    let doc = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();
    for a in doc.select(&sel_a) {
        let Some(href) = a.value().attr("href") else { continue };
        let Ok(mut resolved) = base.join(href.trim()) else { continue };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if !links.contains(&resolved) {
            links.push(resolved);
        }
    }

    FetchedPage {
        title: element_text(&doc, &sel_title),
        body_text: element_text(&doc, &sel_body),
        head_text: element_text(&doc, &sel_head),
        links,
        last_modified: 0,
        size: html.len() as u64,
    }
}
