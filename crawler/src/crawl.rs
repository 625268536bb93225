use crate::fetch::{Fetcher, PageStamp};
use sift_core::tokenizer::{tokenize_field, Normalizer};
use sift_core::{Field, IndexStore, PageId, StoreError};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub seed_id: Option<PageId>,
    /// Pages fetched and indexed, re-crawls included.
    pub visited: usize,
    pub failed: usize,
    /// Pages crawled a second time because a newer version was observed.
    pub recrawled: usize,
    /// Page ids in the store when the crawl finished.
    pub allocated: usize,
}

/// Frontier position for one run: the id cursor plus pages queued for a re-crawl.
struct Frontier {
    cursor: PageId,
    requeued: VecDeque<PageId>,
    refreshed: HashSet<PageId>,
}

impl Frontier {
    fn next(&mut self, next_page_id: PageId) -> Option<PageId> {
        if self.cursor < next_page_id {
            let id = self.cursor;
            self.cursor += 1;
            return Some(id);
        }
        self.requeued.pop_front()
    }
}

/// Sequential crawler. The store's page records are the frontier: pages are visited in
/// id order starting at the seed, and discovering a link allocates the next id.
pub struct Crawler<F, N> {
    store: IndexStore,
    fetcher: F,
    normalizer: N,
    max_pages: usize,
}

impl<F: Fetcher, N: Normalizer> Crawler<F, N> {
    pub fn new(store: IndexStore, fetcher: F, normalizer: N, max_pages: usize) -> Self {
        Self { store, fetcher, normalizer, max_pages }
    }

    pub fn store(&self) -> &IndexStore { &self.store }

    /// Crawl until the frontier is exhausted. Fetch failures are logged and skipped;
    /// store errors abort the run.
    pub async fn run(&self, seed: &str) -> Result<CrawlSummary, StoreError> {
        let mut summary = CrawlSummary::default();
        let seed_id = match self.store.page_id(seed)? {
            Some(id) => id,
            None if self.store.page_count()? >= self.max_pages => {
                warn!(seed, max_pages = self.max_pages, "page cap already reached, nothing to crawl");
                summary.allocated = self.store.page_count()?;
                return Ok(summary);
            }
            None => self.store.add_page(seed, "", 0, 0)?,
        };
        summary.seed_id = Some(seed_id);
        info!(seed, seed_id, max_pages = self.max_pages, "starting crawl");

        let mut frontier = Frontier { cursor: seed_id, requeued: VecDeque::new(), refreshed: HashSet::new() };
        while let Some(page_id) = frontier.next(self.store.next_page_id()?) {
            let recrawl = frontier.refreshed.contains(&page_id);
            if self.visit(page_id, &mut frontier).await? {
                summary.visited += 1;
                if recrawl {
                    summary.recrawled += 1;
                }
            } else {
                summary.failed += 1;
            }
        }

        summary.allocated = self.store.page_count()?;
        info!(
            visited = summary.visited,
            failed = summary.failed,
            recrawled = summary.recrawled,
            allocated = summary.allocated,
            "crawl finished"
        );
        Ok(summary)
    }

    /// Fetch and index one page, then process its links. `false` if the fetch failed.
    async fn visit(&self, page_id: PageId, frontier: &mut Frontier) -> Result<bool, StoreError> {
        let page = self
            .store
            .page(page_id)?
            .ok_or_else(|| StoreError::Integrity(format!("frontier id {page_id} has no page record")))?;

        let fetched = match self.fetcher.fetch(&page.url).await {
            Ok(f) => f,
            Err(e) => {
                warn!(page_id, url = %page.url, error = %e, "fetch failed, skipping");
                return Ok(false);
            }
        };

        self.store.add_page(&page.url, &fetched.title, fetched.last_modified, fetched.size)?;
        self.store.update_page_stamp(page_id, fetched.last_modified, fetched.size)?;

        // The title field covers all of <head>, which is usually just <title>.
        let head = if fetched.head_text.is_empty() { &fetched.title } else { &fetched.head_text };
        let title = tokenize_field(head, &self.normalizer);
        let body = tokenize_field(&fetched.body_text, &self.normalizer);
        self.store.index_field(page_id, Field::Title, &title)?;
        self.store.index_field(page_id, Field::Body, &body)?;
        info!(page_id, url = %page.url, title = %fetched.title, body_terms = body.len(), links = fetched.links.len(), "crawled page");

        for link in &fetched.links {
            self.follow(page_id, link, frontier).await?;
        }
        Ok(true)
    }

    async fn follow(&self, parent_id: PageId, url: &str, frontier: &mut Frontier) -> Result<(), StoreError> {
        if let Some(child_id) = self.store.page_id(url)? {
            if child_id == parent_id {
                return Ok(());
            }
            self.store.add_child_edge(parent_id, child_id)?;
            // Pages still ahead of the cursor will be fetched anyway.
            if child_id >= frontier.cursor || frontier.refreshed.contains(&child_id) {
                return Ok(());
            }
            let stored = self.store.page(child_id)?.map(|p| p.last_modified).unwrap_or(0);
            match self.fetcher.probe(url).await {
                Ok(stamp) if stamp.last_modified > stored => {
                    debug!(child_id, url, stored, observed = stamp.last_modified, "page changed, queued for re-crawl");
                    frontier.refreshed.insert(child_id);
                    frontier.requeued.push_back(child_id);
                }
                Ok(_) => trace!(child_id, url, "page is current"),
                Err(e) => debug!(child_id, url, error = %e, "probe failed, keeping stored page"),
            }
            return Ok(());
        }

        if self.store.page_count()? >= self.max_pages {
            trace!(url, "page cap reached, not enqueuing");
            return Ok(());
        }
        let stamp = self.observe(url).await;
        let child_id = self.store.add_page(url, "", stamp.last_modified, stamp.size)?;
        self.store.add_child_edge(parent_id, child_id)?;
        Ok(())
    }

    async fn observe(&self, url: &str) -> PageStamp {
        match self.fetcher.probe(url).await {
            Ok(stamp) => stamp,
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                PageStamp::default()
            }
        }
    }
}
