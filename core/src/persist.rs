use crate::error::{Result, StoreError};
use crate::index::{Field, Page, PageId, Postings, WordId};
use crate::tokenizer::term_frequencies;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, trace};

const NEXT_PAGE_ID: &str = "next_page_id";
const NEXT_WORD_ID: &str = "next_word_id";

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

/// wordId -> frequency of that word in one field of one page.
type ForwardEntry = BTreeMap<WordId, u32>;

#[derive(Clone)]
struct FieldTrees {
    /// wordId -> Postings
    postings: Tree,
    /// pageId -> Vec<String>, retained stems in text order
    sequences: Tree,
    /// pageId -> ForwardEntry
    forward: Tree,
}

/// Durable index over sled. Every mutating call flushes before it returns.
///
/// Cloning is cheap and shares the same underlying database; a single writer is
/// assumed for the duration of a crawl.
#[derive(Clone)]
pub struct IndexStore {
    db: Db,
    meta: Tree,
    pages: Tree,
    url_ids: Tree,
    word_ids: Tree,
    words: Tree,
    title: FieldTrees,
    body: FieldTrees,
}

fn key(id: u32) -> [u8; 4] { id.to_be_bytes() }

fn decode_id(bytes: &[u8]) -> Result<u32> {
    <[u8; 4]>::try_from(bytes)
        .map(u32::from_be_bytes)
        .map_err(|_| StoreError::Integrity(format!("malformed id of {} bytes", bytes.len())))
}

fn get<T: DeserializeOwned>(tree: &Tree, k: impl AsRef<[u8]>) -> Result<Option<T>> {
    match tree.get(k)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode inside a transaction, aborting it on failure.
fn encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

/// Returns the current value of a counter and advances it by one, inside a transaction.
fn bump_in(meta: &TransactionalTree, name: &str) -> TxResult<u32> {
    let current = match meta.get(name)? {
        Some(bytes) => decode_id(&bytes).map_err(ConflictableTransactionError::Abort)?,
        None => 0,
    };
    meta.insert(name, &(current + 1).to_be_bytes()[..])?;
    Ok(current)
}

fn put<T: Serialize>(tree: &Tree, k: impl AsRef<[u8]>, value: &T) -> Result<()> {
    tree.insert(k, bincode::serialize(value)?)?;
    Ok(())
}

/// True iff `words` occurs as a contiguous run inside `sequence`. The empty phrase matches.
pub fn sequence_contains<S: AsRef<str>>(sequence: &[String], words: &[S]) -> bool {
    if words.is_empty() {
        return true;
    }
    sequence
        .windows(words.len())
        .any(|window| window.iter().zip(words).all(|(a, b)| a == b.as_ref()))
}

impl IndexStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Writes flush synchronously, so the background flusher is not needed.
        let db = sled::Config::new().path(path.as_ref()).flush_every_ms(None).open()?;
        Self::from_db(db)
    }

    /// In-memory store that is discarded on drop.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        let field_trees = |field: Field| -> Result<FieldTrees> {
            Ok(FieldTrees {
                postings: db.open_tree(format!("{field}_postings"))?,
                sequences: db.open_tree(format!("{field}_sequences"))?,
                forward: db.open_tree(format!("{field}_forward"))?,
            })
        };
        let title = field_trees(Field::Title)?;
        let body = field_trees(Field::Body)?;
        Ok(Self {
            meta: db.open_tree("meta")?,
            pages: db.open_tree("pages")?,
            url_ids: db.open_tree("url_ids")?,
            word_ids: db.open_tree("word_ids")?,
            words: db.open_tree("words")?,
            title,
            body,
            db,
        })
    }

    fn trees(&self, field: Field) -> &FieldTrees {
        match field {
            Field::Title => &self.title,
            Field::Body => &self.body,
        }
    }

    fn commit(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn counter(&self, name: &str) -> Result<u32> {
        match self.meta.get(name)? {
            Some(bytes) => decode_id(&bytes),
            None => Ok(0),
        }
    }

    // --- pages ---

    /// One past the highest allocated page id.
    pub fn next_page_id(&self) -> Result<PageId> { self.counter(NEXT_PAGE_ID) }

    /// Pages are never deleted, so this is the page id counter.
    pub fn page_count(&self) -> Result<usize> { Ok(self.next_page_id()? as usize) }

    pub fn page_id(&self, url: &str) -> Result<Option<PageId>> {
        match self.url_ids.get(url.as_bytes())? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn page(&self, page_id: PageId) -> Result<Option<Page>> {
        get(&self.pages, key(page_id))
    }

    fn require_page(&self, page_id: PageId) -> Result<Page> {
        self.page(page_id)?.ok_or_else(|| StoreError::missing_page(page_id))
    }

    fn put_page(&self, page: &Page) -> Result<()> {
        put(&self.pages, key(page.page_id), page)
    }

    /// Id for `url`, creating an untitled placeholder page if the URL is new.
    pub fn allocate_page_id(&self, url: &str) -> Result<PageId> {
        self.add_page(url, "", 0, 0)
    }

    /// Insert a page, or patch the title of an existing one when `title` is non-empty.
    pub fn add_page(&self, url: &str, title: &str, last_modified: i64, size: u64) -> Result<PageId> {
        if let Some(page_id) = self.page_id(url)? {
            if !title.is_empty() {
                let mut page = self.require_page(page_id)?;
                if page.title != title {
                    page.title = title.to_string();
                    self.put_page(&page)?;
                    self.commit()?;
                }
            }
            return Ok(page_id);
        }

        // Counter, sequences, page record and url entry land together or not at all.
        let page_id = (&self.meta, &self.pages, &self.url_ids, &self.title.sequences, &self.body.sequences)
            .transaction(|(meta, pages, url_ids, title_seq, body_seq)| -> TxResult<PageId> {
                let page_id = bump_in(meta, NEXT_PAGE_ID)?;
                let k = key(page_id);
                let empty = encode(&Vec::<String>::new())?;
                title_seq.insert(&k[..], empty.clone())?;
                body_seq.insert(&k[..], empty)?;
                pages.insert(&k[..], encode(&Page::new(page_id, url, title, last_modified, size))?)?;
                url_ids.insert(url.as_bytes(), &k[..])?;
                Ok(page_id)
            })?;
        self.commit()?;
        debug!(page_id, url, "added page");
        Ok(page_id)
    }

    /// Record freshly observed metadata for a page.
    pub fn update_page_stamp(&self, page_id: PageId, last_modified: i64, size: u64) -> Result<()> {
        let mut page = self.require_page(page_id)?;
        if page.last_modified == last_modified && page.size == size {
            return Ok(());
        }
        page.last_modified = last_modified;
        page.size = size;
        self.put_page(&page)?;
        self.commit()
    }

    pub fn add_child_edge(&self, parent_id: PageId, child_id: PageId) -> Result<()> {
        if self.page(child_id)?.is_none() {
            return Err(StoreError::Integrity(format!(
                "edge {parent_id} -> {child_id} references a missing page"
            )));
        }
        let mut parent = self.require_page(parent_id)?;
        if parent.child_ids.contains(&child_id) {
            return Ok(());
        }
        parent.child_ids.push(child_id);
        self.put_page(&parent)?;
        self.commit()
    }

    /// Pages listing `page_id` as a child, in id order. Derived by scanning.
    pub fn parent_ids(&self, page_id: PageId) -> Result<Vec<PageId>> {
        let mut parents = Vec::new();
        for entry in self.pages.iter() {
            let (_, bytes) = entry?;
            let page: Page = bincode::deserialize(&bytes)?;
            if page.child_ids.contains(&page_id) {
                parents.push(page.page_id);
            }
        }
        Ok(parents)
    }

    /// All page ids in allocation order.
    pub fn all_page_ids(&self) -> Result<Vec<PageId>> {
        self.pages
            .iter()
            .keys()
            .map(|k| decode_id(&k?))
            .collect()
    }

    // --- words ---

    pub fn word_id(&self, token: &str) -> Result<Option<WordId>> {
        match self.word_ids.get(token.as_bytes())? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn word(&self, word_id: WordId) -> Result<Option<String>> {
        match self.words.get(key(word_id))? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| StoreError::Integrity(format!("word {word_id} is not valid utf-8"))),
            None => Ok(None),
        }
    }

    fn intern_word(&self, token: &str) -> Result<WordId> {
        if let Some(word_id) = self.word_id(token)? {
            return Ok(word_id);
        }
        let word_id = (&self.meta, &self.words, &self.word_ids)
            .transaction(|(meta, words, word_ids)| -> TxResult<WordId> {
                let word_id = bump_in(meta, NEXT_WORD_ID)?;
                words.insert(&key(word_id)[..], token.as_bytes())?;
                word_ids.insert(token.as_bytes(), &key(word_id)[..])?;
                Ok(word_id)
            })?;
        trace!(word_id, token, "new word");
        Ok(word_id)
    }

    pub fn allocate_word_id(&self, token: &str) -> Result<WordId> {
        let word_id = self.intern_word(token)?;
        self.commit()?;
        Ok(word_id)
    }

    // --- postings and sequences ---

    pub fn postings(&self, field: Field, word_id: WordId) -> Result<Postings> {
        Ok(get(&self.trees(field).postings, key(word_id))?.unwrap_or_default())
    }

    /// Distinct pages containing the word in either field.
    pub fn document_frequency(&self, word_id: WordId) -> Result<usize> {
        let mut pages: BTreeSet<PageId> = BTreeSet::new();
        for field in Field::ALL {
            pages.extend(self.postings(field, word_id)?.into_keys());
        }
        Ok(pages.len())
    }

    fn set_posting(&self, field: Field, word_id: WordId, page_id: PageId, frequency: u32) -> Result<()> {
        let tree = &self.trees(field).postings;
        let mut postings: Postings = get(tree, key(word_id))?.unwrap_or_default();
        postings.insert(page_id, frequency);
        put(tree, key(word_id), &postings)
    }

    fn drop_posting(&self, field: Field, word_id: WordId, page_id: PageId) -> Result<()> {
        let tree = &self.trees(field).postings;
        let mut postings: Postings = get(tree, key(word_id))?.unwrap_or_default();
        if postings.remove(&page_id).is_some() {
            if postings.is_empty() {
                tree.remove(key(word_id))?;
            } else {
                put(tree, key(word_id), &postings)?;
            }
        }
        Ok(())
    }

    fn forward(&self, field: Field, page_id: PageId) -> Result<ForwardEntry> {
        Ok(get(&self.trees(field).forward, key(page_id))?.unwrap_or_default())
    }

    fn require_sequence(&self, field: Field, page_id: PageId) -> Result<Vec<String>> {
        if let Some(sequence) = get(&self.trees(field).sequences, key(page_id))? {
            return Ok(sequence);
        }
        if self.page(page_id)?.is_some() {
            Err(StoreError::Integrity(format!("page {page_id} has no {field} word sequence")))
        } else {
            Err(StoreError::missing_page(page_id))
        }
    }

    pub fn word_sequence(&self, field: Field, page_id: PageId) -> Result<Option<Vec<String>>> {
        if self.page(page_id)?.is_none() {
            return Ok(None);
        }
        self.require_sequence(field, page_id).map(Some)
    }

    /// Set the frequency of `word` in one field of a page (last write wins) and
    /// append the word to that field's sequence.
    pub fn add_word_occurrence(&self, page_id: PageId, field: Field, word: &str, frequency: u32) -> Result<WordId> {
        let mut sequence = self.require_sequence(field, page_id)?;
        let word_id = self.intern_word(word)?;
        self.set_posting(field, word_id, page_id, frequency)?;

        let mut forward = self.forward(field, page_id)?;
        forward.insert(word_id, frequency);
        put(&self.trees(field).forward, key(page_id), &forward)?;

        sequence.push(word.to_string());
        put(&self.trees(field).sequences, key(page_id), &sequence)?;
        self.commit()?;
        Ok(word_id)
    }

    /// Replace the indexed content of one field of a page with `tokens`.
    ///
    /// Writes a posting per distinct token with its count, drops postings for words
    /// the field no longer contains, and stores `tokens` as the phrase sequence.
    pub fn index_field(&self, page_id: PageId, field: Field, tokens: &[String]) -> Result<()> {
        self.require_sequence(field, page_id)?;
        let trees = self.trees(field);

        let mut forward = ForwardEntry::new();
        for (word, frequency) in term_frequencies(tokens) {
            let word_id = self.intern_word(&word)?;
            self.set_posting(field, word_id, page_id, frequency)?;
            forward.insert(word_id, frequency);
        }
        for word_id in self.forward(field, page_id)?.into_keys() {
            if !forward.contains_key(&word_id) {
                self.drop_posting(field, word_id, page_id)?;
            }
        }
        put(&trees.forward, key(page_id), &forward)?;
        put(&trees.sequences, key(page_id), &tokens.to_vec())?;
        self.commit()?;
        debug!(page_id, %field, terms = forward.len(), tokens = tokens.len(), "indexed field");
        Ok(())
    }

    /// Most frequent words of a page, title and body frequencies summed.
    pub fn top_keywords(&self, page_id: PageId, limit: usize) -> Result<Vec<(String, u32)>> {
        let mut combined: HashMap<WordId, u32> = HashMap::new();
        for field in Field::ALL {
            for (word_id, frequency) in self.forward(field, page_id)? {
                *combined.entry(word_id).or_insert(0) += frequency;
            }
        }
        let mut ranked = combined
            .into_iter()
            .map(|(word_id, frequency)| {
                let word = self
                    .word(word_id)?
                    .ok_or_else(|| StoreError::Integrity(format!("word {word_id} has no token")))?;
                Ok((word, frequency))
            })
            .collect::<Result<Vec<_>>>()?;
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    pub fn contains_phrase<S: AsRef<str>>(&self, field: Field, page_id: PageId, words: &[S]) -> Result<bool> {
        Ok(match self.word_sequence(field, page_id)? {
            Some(sequence) => sequence_contains(&sequence, words),
            None => false,
        })
    }

    /// Pages whose `field` contains `words` contiguously, in id order.
    pub fn pages_containing_phrase<S: AsRef<str>>(&self, field: Field, words: &[S]) -> Result<Vec<PageId>> {
        let mut hits = Vec::new();
        for entry in self.trees(field).sequences.iter() {
            let (k, bytes) = entry?;
            let sequence: Vec<String> = bincode::deserialize(&bytes)?;
            if sequence_contains(&sequence, words) {
                hits.push(decode_id(&k)?);
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn phrase_must_be_contiguous() {
        let s = seq(&["hong", "kong", "univers", "scienc"]);
        assert!(sequence_contains(&s, &["hong", "kong"]));
        assert!(sequence_contains(&s, &["univers", "scienc"]));
        assert!(!sequence_contains(&s, &["hong", "univers"]));
        assert!(!sequence_contains(&s, &["kong", "hong"]));
        assert!(!sequence_contains(&seq(&["hong"]), &["hong", "kong"]));
    }
}
