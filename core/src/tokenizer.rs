use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Auxiliary verbs that are always stopped, even with a custom stopword file.
const ALWAYS_STOPPED: [&str; 5] = ["is", "am", "are", "was", "were"];

/// Characters that separate tokens in page text, besides whitespace.
const FIELD_DELIMITERS: [char; 8] = ['(', ')', ',', '.', '?', ':', '/', '!'];

/// Stopword filtering and stemming, injected into the crawler and the query engine.
pub trait Normalizer {
    fn is_stop_word(&self, token: &str) -> bool;
    fn stem(&self, token: &str) -> String;
}

impl<N: Normalizer + ?Sized> Normalizer for &N {
    fn is_stop_word(&self, token: &str) -> bool { (**self).is_stop_word(token) }
    fn stem(&self, token: &str) -> String { (**self).stem(token) }
}

/// English stopword list plus the Snowball English stemmer.
pub struct StopStem {
    stemmer: Stemmer,
    stopwords: HashSet<String>,
}

impl StopStem {
    pub fn new() -> Self {
        Self::with_stopwords(STOPWORDS.iter().map(|w| w.to_string()))
    }

    pub fn with_stopwords<I: IntoIterator<Item = String>>(words: I) -> Self {
        let mut stopwords: HashSet<String> = words.into_iter().collect();
        stopwords.extend(ALWAYS_STOPPED.iter().map(|w| w.to_string()));
        Self { stemmer: Stemmer::create(Algorithm::English), stopwords }
    }

    /// Load stopwords from a file with one word per line.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        let words = text
            .lines()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        Ok(Self::with_stopwords(words))
    }
}

impl Default for StopStem {
    fn default() -> Self { Self::new() }
}

impl Normalizer for StopStem {
    fn is_stop_word(&self, token: &str) -> bool { self.stopwords.contains(token) }
    fn stem(&self, token: &str) -> String { self.stemmer.stem(token).into_owned() }
}

fn fold(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Lowercase, stop and stem a single query or page token. `None` when nothing survives.
pub fn normalize_term<N: Normalizer>(token: &str, normalizer: &N) -> Option<String> {
    let token = fold(token);
    if token.is_empty() || normalizer.is_stop_word(&token) {
        return None;
    }
    let stem = normalizer.stem(&token);
    if stem.is_empty() { None } else { Some(stem) }
}

/// Tokenize one page field (title or body) into retained stems, in text order.
///
/// Splits on whitespace and `(),.?:/!`; the result is both the source of term
/// frequencies and the word sequence used for phrase matching.
pub fn tokenize_field<N: Normalizer>(text: &str, normalizer: &N) -> Vec<String> {
    let folded = fold(text);
    folded
        .split(|c: char| c.is_whitespace() || FIELD_DELIMITERS.contains(&c))
        .filter(|t| !t.is_empty())
        .filter_map(|t| normalize_term(t, normalizer))
        .collect()
}

/// Aggregate a token stream into (term, count) pairs, ordered by first appearance.
pub fn term_frequencies(tokens: &[String]) -> Vec<(String, u32)> {
    let mut order: Vec<(String, u32)> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        match slot.get(token.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                slot.insert(token.as_str(), order.len());
                order.push((token.clone(), 1));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_field_punctuation() {
        let stop = StopStem::new();
        let t = tokenize_field("rust(lang),fast.tool?web:crab/shell!", &stop);
        assert_eq!(t, vec!["rust", "lang", "fast", "tool", "web", "crab", "shell"]);
    }

    #[test]
    fn counts_in_first_appearance_order() {
        let toks: Vec<String> = ["b", "a", "b", "c", "b"].iter().map(|s| s.to_string()).collect();
        let tf = term_frequencies(&toks);
        assert_eq!(tf, vec![("b".to_string(), 3), ("a".to_string(), 1), ("c".to_string(), 1)]);
    }
}
