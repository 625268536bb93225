use crate::error::Result;
use crate::index::{Field, PageId, Postings, WordId};
use crate::persist::IndexStore;
use crate::tokenizer::{normalize_term, Normalizer};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

lazy_static! {
    /// A quoted span is a phrase; any other whitespace-delimited run is a bare term.
    static ref QUERY_RE: Regex = Regex::new(r#""([^"]+)"|(\S+)"#).expect("valid regex");
}

pub const DEFAULT_MAX_RESULTS: usize = 300;
pub const DEFAULT_TITLE_BOOST: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// Sum over query terms of `(1 + ln tf) * idf`, title hits boosted.
    #[default]
    LogTfSum,
    /// Cosine similarity between the query vector and a max-tf normalized document vector.
    Cosine,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub max_results: usize,
    pub title_boost: f64,
    pub scoring: ScoringMode,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { max_results: DEFAULT_MAX_RESULTS, title_boost: DEFAULT_TITLE_BOOST, scoring: ScoringMode::default() }
    }
}

/// A raw query after normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Each phrase as its normalized words.
    pub phrases: Vec<Vec<String>>,
    /// Terms typed outside quotes.
    pub bare_terms: Vec<String>,
    /// Every scoring term: bare terms and phrase words, duplicates kept.
    pub terms: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool { self.phrases.is_empty() && self.terms.is_empty() }
}

pub fn parse_query<N: Normalizer>(raw: &str, normalizer: &N) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    for caps in QUERY_RE.captures_iter(raw) {
        if let Some(phrase) = caps.get(1) {
            let words: Vec<String> = phrase
                .as_str()
                .split_whitespace()
                .filter_map(|w| normalize_term(w, normalizer))
                .collect();
            if words.is_empty() { continue; }
            parsed.terms.extend(words.iter().cloned());
            parsed.phrases.push(words);
        } else if let Some(token) = caps.get(2) {
            if let Some(term) = normalize_term(token.as_str(), normalizer) {
                parsed.bare_terms.push(term.clone());
                parsed.terms.push(term);
            }
        }
    }
    parsed
}

/// `log10(total / df)`, or 0 for a term no page contains.
pub fn inverse_document_frequency(total_pages: usize, document_frequency: usize) -> f64 {
    if document_frequency == 0 || total_pages == 0 {
        return 0.0;
    }
    (total_pages as f64 / document_frequency as f64).log10()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub page_id: PageId,
    pub url: String,
    pub title: String,
    pub score: f64,
    pub last_modified: i64,
    pub size: u64,
}

struct QueryTerm {
    word_id: Option<WordId>,
    /// Occurrences in the query, phrase words included.
    count: usize,
    idf: f64,
    weight: f64,
}

/// Ranked retrieval over an [`IndexStore`].
///
/// Holds idf and postings caches that assume the index does not change between
/// queries; call [`QueryEngine::refresh`] after a crawl. Not synchronized: share one
/// engine across threads only behind a lock.
pub struct QueryEngine<N: Normalizer> {
    store: IndexStore,
    normalizer: N,
    options: QueryOptions,
    /// Read from the store on first use after construction or `refresh`.
    total_pages: Option<usize>,
    idf_cache: HashMap<WordId, f64>,
    postings_cache: HashMap<(Field, WordId), Arc<Postings>>,
}

impl<N: Normalizer> QueryEngine<N> {
    pub fn new(store: IndexStore, normalizer: N) -> Self {
        Self::with_options(store, normalizer, QueryOptions::default())
    }

    pub fn with_options(store: IndexStore, normalizer: N, options: QueryOptions) -> Self {
        Self { store, normalizer, options, total_pages: None, idf_cache: HashMap::new(), postings_cache: HashMap::new() }
    }

    pub fn store(&self) -> &IndexStore { &self.store }

    pub fn options(&self) -> &QueryOptions { &self.options }

    /// Drop cached statistics so later queries see the current index.
    pub fn refresh(&mut self) {
        self.total_pages = None;
        self.idf_cache.clear();
        self.postings_cache.clear();
    }

    fn postings(&mut self, field: Field, word_id: WordId) -> Result<Arc<Postings>> {
        if let Some(p) = self.postings_cache.get(&(field, word_id)) {
            return Ok(Arc::clone(p));
        }
        let postings = Arc::new(self.store.postings(field, word_id)?);
        self.postings_cache.insert((field, word_id), Arc::clone(&postings));
        Ok(postings)
    }

    fn idf_for(&mut self, word_id: WordId) -> Result<f64> {
        if let Some(&idf) = self.idf_cache.get(&word_id) {
            return Ok(idf);
        }
        let mut pages: BTreeSet<PageId> = BTreeSet::new();
        for field in Field::ALL {
            pages.extend(self.postings(field, word_id)?.keys().copied());
        }
        let total_pages = match self.total_pages {
            Some(n) => n,
            None => *self.total_pages.insert(self.store.page_count()?),
        };
        let idf = inverse_document_frequency(total_pages, pages.len());
        self.idf_cache.insert(word_id, idf);
        Ok(idf)
    }

    /// idf of a normalized term; 0 for words the index has never seen.
    pub fn idf(&mut self, term: &str) -> Result<f64> {
        match self.store.word_id(term)? {
            Some(word_id) => self.idf_for(word_id),
            None => Ok(0.0),
        }
    }

    pub fn parse(&self, raw: &str) -> ParsedQuery {
        parse_query(raw, &self.normalizer)
    }

    pub fn search(&mut self, raw: &str) -> Result<Vec<SearchResult>> {
        let parsed = self.parse(raw);
        debug!(phrases = ?parsed.phrases, terms = ?parsed.terms, "parsed query");
        if parsed.is_empty() {
            return Ok(vec![]);
        }

        let candidates = match self.filter_candidates(&parsed)? {
            Some(c) => c,
            None => return Ok(vec![]),
        };

        let query_terms = self.weigh_query(&parsed.terms)?;
        let norm = query_terms.iter().map(|t| t.weight * t.weight).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Ok(vec![]);
        }

        let mut scored: Vec<(PageId, f64)> = Vec::new();
        for page_id in candidates {
            let score = match self.options.scoring {
                ScoringMode::LogTfSum => self.log_tf_score(page_id, &query_terms)?,
                ScoringMode::Cosine => self.cosine_score(page_id, &query_terms, norm)?,
            };
            if score > 0.0 {
                scored.push((page_id, score));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        debug!(hits = scored.len(), "scored candidates");

        let mut results = Vec::with_capacity(scored.len().min(self.options.max_results));
        for (page_id, score) in scored.into_iter().take(self.options.max_results) {
            if let Some(page) = self.store.page(page_id)? {
                results.push(SearchResult {
                    page_id,
                    url: page.url,
                    title: page.title,
                    score,
                    last_modified: page.last_modified,
                    size: page.size,
                });
            }
        }
        Ok(results)
    }

    /// Intersect all pages with each phrase's hits. `None` means nothing can match.
    fn filter_candidates(&self, parsed: &ParsedQuery) -> Result<Option<BTreeSet<PageId>>> {
        let mut candidates: BTreeSet<PageId> = self.store.all_page_ids()?.into_iter().collect();
        for phrase in &parsed.phrases {
            let mut hits: BTreeSet<PageId> = BTreeSet::new();
            for field in Field::ALL {
                hits.extend(self.store.pages_containing_phrase(field, phrase.as_slice())?);
            }
            if hits.is_empty() {
                if parsed.bare_terms.is_empty() {
                    return Ok(None);
                }
                // Bare terms still get a chance; the phrase does not narrow anything.
                debug!(phrase = %phrase.join(" "), "phrase has no hits, not filtering");
                continue;
            }
            candidates = candidates.intersection(&hits).copied().collect();
        }
        Ok(Some(candidates))
    }

    /// One entry per distinct term, in first-appearance order.
    fn weigh_query(&mut self, terms: &[String]) -> Result<Vec<QueryTerm>> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for term in terms {
            match counts.iter_mut().find(|(t, _)| *t == term.as_str()) {
                Some((_, c)) => *c += 1,
                None => counts.push((term.as_str(), 1)),
            }
        }
        let max_count = counts.iter().map(|(_, c)| *c).max().unwrap_or(1) as f64;

        let mut weighted = Vec::with_capacity(counts.len());
        for (term, count) in counts {
            let word_id = self.store.word_id(term)?;
            let idf = match word_id {
                Some(id) => self.idf_for(id)?,
                None => 0.0,
            };
            weighted.push(QueryTerm { word_id, count, idf, weight: (count as f64 / max_count) * idf });
        }
        Ok(weighted)
    }

    fn frequencies(&mut self, page_id: PageId, word_id: WordId) -> Result<(u32, u32)> {
        let body = self.postings(Field::Body, word_id)?.get(&page_id).copied().unwrap_or(0);
        let title = self.postings(Field::Title, word_id)?.get(&page_id).copied().unwrap_or(0);
        Ok((body, title))
    }

    fn log_tf_score(&mut self, page_id: PageId, terms: &[QueryTerm]) -> Result<f64> {
        let mut score = 0.0;
        for term in terms {
            let Some(word_id) = term.word_id else { continue };
            let (tb, tt) = self.frequencies(page_id, word_id)?;
            if tb > 0 {
                score += (1.0 + (tb as f64).ln()) * term.idf;
            }
            if tt > 0 {
                score += (1.0 + (tt as f64).ln()) * term.idf * self.options.title_boost;
            }
        }
        Ok(score)
    }

    fn cosine_score(&mut self, page_id: PageId, terms: &[QueryTerm], query_norm: f64) -> Result<f64> {
        let mut freqs = Vec::with_capacity(terms.len());
        for term in terms {
            freqs.push(match term.word_id {
                Some(word_id) => self.frequencies(page_id, word_id)?,
                None => (0, 0),
            });
        }
        let max_body = freqs.iter().map(|f| f.0).max().unwrap_or(0).max(1) as f64;
        let max_title = freqs.iter().map(|f| f.1).max().unwrap_or(0).max(1) as f64;

        let mut dot = 0.0;
        let mut doc_norm = 0.0;
        for (term, (tb, tt)) in terms.iter().zip(freqs) {
            // A repeated query term contributes once per occurrence.
            let weight = term.count as f64
                * ((tb as f64 / max_body) * term.idf + (tt as f64 / max_title) * term.idf * self.options.title_boost);
            dot += weight * term.weight;
            doc_norm += weight * weight;
        }
        if doc_norm == 0.0 {
            return Ok(0.0);
        }
        Ok(dot / (query_norm * doc_norm.sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::StopStem;

    #[test]
    fn parses_phrases_and_terms() {
        let stop = StopStem::new();
        let q = parse_query(r#""Hong Kong" university of the"#, &stop);
        assert_eq!(q.phrases, vec![vec!["hong".to_string(), "kong".to_string()]]);
        assert_eq!(q.bare_terms, vec![stop.stem("university")]);
        assert_eq!(q.terms.len(), 3);
    }

    #[test]
    fn stopword_only_phrase_is_discarded() {
        let stop = StopStem::new();
        let q = parse_query(r#""of the" "#, &stop);
        assert!(q.is_empty());
    }

    #[test]
    fn idf_is_zero_when_every_page_matches() {
        assert_eq!(inverse_document_frequency(4, 4), 0.0);
        assert_eq!(inverse_document_frequency(4, 0), 0.0);
        assert!(inverse_document_frequency(10, 1) > inverse_document_frequency(10, 2));
    }
}
