use sift_core::{Field, IndexStore, StoreError};
use tempfile::tempdir;

fn words(ws: &[&str]) -> Vec<String> {
    ws.iter().map(|w| w.to_string()).collect()
}

#[test]
fn add_page_is_idempotent_and_patches_title() {
    let store = IndexStore::temporary().unwrap();
    let id = store.add_page("https://a.test/", "", 10, 100).unwrap();
    assert_eq!(store.page(id).unwrap().unwrap().url, "https://a.test/");
    assert_eq!(store.word_sequence(Field::Title, id).unwrap(), Some(vec![]));
    assert_eq!(store.word_sequence(Field::Body, id).unwrap(), Some(vec![]));

    let again = store.add_page("https://a.test/", "Home", 99, 999).unwrap();
    assert_eq!(again, id);
    let page = store.page(id).unwrap().unwrap();
    assert_eq!(page.title, "Home");
    assert_eq!(page.last_modified, 10);
    assert_eq!(page.size, 100);

    // an empty title never clears a stored one
    store.add_page("https://a.test/", "", 0, 0).unwrap();
    assert_eq!(store.page(id).unwrap().unwrap().title, "Home");
    assert_eq!(store.allocate_page_id("https://a.test/").unwrap(), id);
}

#[test]
fn ids_follow_allocation_order() {
    let store = IndexStore::temporary().unwrap();
    let a = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    let b = store.add_page("https://b.test/", "B", 0, 0).unwrap();
    let c = store.allocate_page_id("https://c.test/").unwrap();
    assert_eq!((a, b, c), (0, 1, 2));
    assert_eq!(store.all_page_ids().unwrap(), vec![0, 1, 2]);
    assert_eq!(store.next_page_id().unwrap(), 3);
    assert_eq!(store.page_count().unwrap(), 3);
    assert_eq!(store.page_id("https://b.test/").unwrap(), Some(1));
    assert_eq!(store.page_id("https://missing.test/").unwrap(), None);
    assert!(store.page(42).unwrap().is_none());
}

#[test]
fn word_ids_are_stable() {
    let store = IndexStore::temporary().unwrap();
    let hong = store.allocate_word_id("hong").unwrap();
    let kong = store.allocate_word_id("kong").unwrap();
    assert_ne!(hong, kong);
    assert_eq!(store.allocate_word_id("hong").unwrap(), hong);
    assert_eq!(store.word_id("kong").unwrap(), Some(kong));
    assert_eq!(store.word(hong).unwrap().as_deref(), Some("hong"));
    assert_eq!(store.word_id("macau").unwrap(), None);
}

#[test]
fn child_edges_have_set_semantics() {
    let store = IndexStore::temporary().unwrap();
    let parent = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    let child = store.add_page("https://a.test/x", "", 0, 0).unwrap();
    store.add_child_edge(parent, child).unwrap();
    store.add_child_edge(parent, child).unwrap();
    assert_eq!(store.page(parent).unwrap().unwrap().child_ids, vec![child]);
    assert_eq!(store.parent_ids(child).unwrap(), vec![parent]);
    assert!(store.parent_ids(parent).unwrap().is_empty());
}

#[test]
fn edge_to_unknown_page_is_an_integrity_violation() {
    let store = IndexStore::temporary().unwrap();
    let parent = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    let err = store.add_child_edge(parent, 7).unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
    let err = store.add_word_occurrence(9, Field::Body, "crab", 1).unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[test]
fn postings_are_last_write_wins() {
    let store = IndexStore::temporary().unwrap();
    let page = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    let wid = store.add_word_occurrence(page, Field::Body, "crab", 3).unwrap();
    assert_eq!(store.postings(Field::Body, wid).unwrap().get(&page), Some(&3));
    store.add_word_occurrence(page, Field::Body, "crab", 1).unwrap();
    assert_eq!(store.postings(Field::Body, wid).unwrap().get(&page), Some(&1));
    assert!(store.postings(Field::Title, wid).unwrap().is_empty());
    assert_eq!(store.document_frequency(wid).unwrap(), 1);
}

#[test]
fn occurrences_extend_the_phrase_sequence() {
    let store = IndexStore::temporary().unwrap();
    let page = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    store.add_word_occurrence(page, Field::Title, "hong", 1).unwrap();
    store.add_word_occurrence(page, Field::Title, "kong", 1).unwrap();
    assert!(store.contains_phrase(Field::Title, page, &["hong", "kong"]).unwrap());
    assert!(!store.contains_phrase(Field::Title, page, &["kong", "hong"]).unwrap());
    assert!(!store.contains_phrase(Field::Body, page, &["hong", "kong"]).unwrap());
    assert!(!store.contains_phrase(Field::Title, 99, &["hong"]).unwrap());
}

#[test]
fn index_field_replaces_previous_content() {
    let store = IndexStore::temporary().unwrap();
    let page = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    store.index_field(page, Field::Body, &words(&["crab", "shell", "crab"])).unwrap();
    let crab = store.word_id("crab").unwrap().unwrap();
    let shell = store.word_id("shell").unwrap().unwrap();
    assert_eq!(store.postings(Field::Body, crab).unwrap().get(&page), Some(&2));
    assert_eq!(
        store.word_sequence(Field::Body, page).unwrap(),
        Some(words(&["crab", "shell", "crab"]))
    );

    store.index_field(page, Field::Body, &words(&["crab", "web"])).unwrap();
    assert_eq!(store.postings(Field::Body, crab).unwrap().get(&page), Some(&1));
    assert!(store.postings(Field::Body, shell).unwrap().is_empty());
    assert_eq!(store.pages_containing_phrase(Field::Body, &["crab", "web"]).unwrap(), vec![page]);
    assert!(store.pages_containing_phrase(Field::Body, &["crab", "shell"]).unwrap().is_empty());
}

#[test]
fn top_keywords_sum_title_and_body() {
    let store = IndexStore::temporary().unwrap();
    let page = store.add_page("https://a.test/", "A", 0, 0).unwrap();
    store.index_field(page, Field::Title, &words(&["crab", "web"])).unwrap();
    store
        .index_field(page, Field::Body, &words(&["shell", "shell", "shell", "crab", "crab", "tide", "sand"]))
        .unwrap();

    let top = store.top_keywords(page, 3).unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0], ("crab".to_string(), 3));
    assert_eq!(top[1], ("shell".to_string(), 3));
    assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
    assert!(store.top_keywords(99, 3).unwrap().is_empty());
}

#[test]
fn store_survives_reopen() {
    let dir = tempdir().unwrap();
    let (page, wid) = {
        let store = IndexStore::open(dir.path()).unwrap();
        let page = store.add_page("https://a.test/", "A", 5, 50).unwrap();
        let wid = store.add_word_occurrence(page, Field::Body, "crab", 4).unwrap();
        (page, wid)
    };
    let store = IndexStore::open(dir.path()).unwrap();
    assert_eq!(store.page(page).unwrap().unwrap().title, "A");
    assert_eq!(store.postings(Field::Body, wid).unwrap().get(&page), Some(&4));
    assert_eq!(store.add_page("https://b.test/", "B", 0, 0).unwrap(), page + 1);
    assert_eq!(store.allocate_word_id("crab").unwrap(), wid);
}

#[test]
fn allocation_keeps_ids_urls_and_sequences_in_step() {
    let dir = tempdir().unwrap();
    let urls: Vec<String> = (0..12).map(|n| format!("https://a.test/{n}")).collect();
    {
        let store = IndexStore::open(dir.path()).unwrap();
        for url in &urls[..6] {
            store.allocate_page_id(url).unwrap();
        }
        store.allocate_word_id("crab").unwrap();
    }
    let store = IndexStore::open(dir.path()).unwrap();
    for url in &urls[6..] {
        store.add_page(url, "", 0, 0).unwrap();
    }
    let shell = store.allocate_word_id("shell").unwrap();

    assert_eq!(store.page_count().unwrap(), urls.len());
    assert_eq!(store.all_page_ids().unwrap().len(), urls.len());
    for (expected, url) in urls.iter().enumerate() {
        let id = store.page_id(url).unwrap().unwrap();
        assert_eq!(id as usize, expected);
        assert_eq!(store.page(id).unwrap().unwrap().url, *url);
        assert_eq!(store.word_sequence(Field::Title, id).unwrap(), Some(vec![]));
        assert_eq!(store.word_sequence(Field::Body, id).unwrap(), Some(vec![]));
    }
    assert_eq!(store.word_id("crab").unwrap(), Some(0));
    assert_eq!(shell, 1);
    assert_eq!(store.word(shell).unwrap().as_deref(), Some("shell"));
}
