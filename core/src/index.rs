use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type PageId = u32;
pub type WordId = u32;

/// pageId -> term frequency for one word in one field.
pub type Postings = BTreeMap<PageId, u32>;

/// The two indexed text fields of a page. Scored independently; title hits are boosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Title,
    Body,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Title, Field::Body];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Body => "body",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_id: PageId,
    pub url: String,
    /// Empty until the page itself has been crawled.
    pub title: String,
    /// Epoch milliseconds; 0 when the server did not report one.
    pub last_modified: i64,
    pub size: u64,
    /// Outbound edges as plain ids, deduplicated, in discovery order.
    pub child_ids: Vec<PageId>,
}

impl Page {
    pub fn new(page_id: PageId, url: impl Into<String>, title: impl Into<String>, last_modified: i64, size: u64) -> Self {
        Self { page_id, url: url.into(), title: title.into(), last_modified, size, child_ids: Vec::new() }
    }

    /// Title for display; falls back to the URL for pages that were never crawled.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() { &self.url } else { &self.title }
    }
}
