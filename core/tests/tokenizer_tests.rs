use sift_core::tokenizer::{normalize_term, tokenize_field, Normalizer, StopStem};
use std::io::Write;

#[test]
fn it_normalizes_and_stems() {
    let stop = StopStem::new();
    let words = tokenize_field("Running Runners RUN! The café's menu.", &stop);
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    assert!(words.iter().all(|w| w.chars().all(|c| !c.is_uppercase())));
}

#[test]
fn it_filters_stopwords() {
    let stop = StopStem::new();
    let words = tokenize_field("The quick brown fox and the lazy dog", &stop);
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.first().map(String::as_str), Some("quick"));
}

#[test]
fn it_keeps_text_order() {
    let stop = StopStem::new();
    let words = tokenize_field("crab shell, crab (web)", &stop);
    assert_eq!(words, vec!["crab", "shell", "crab", "web"]);
}

#[test]
fn auxiliaries_are_stopped_with_a_custom_list() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "Foo\n\nbar").unwrap();
    let stop = StopStem::from_file(file.path()).unwrap();
    assert!(stop.is_stop_word("foo"));
    assert!(stop.is_stop_word("bar"));
    assert!(stop.is_stop_word("were"));
    assert!(!stop.is_stop_word("the"));
    assert_eq!(normalize_term("WAS", &stop), None);
    assert_eq!(normalize_term("crab", &stop), Some("crab".to_string()));
}
