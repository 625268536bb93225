use anyhow::Result;
use sift_core::IndexStore;
use std::io::Write;
use time::macros::format_description;
use time::OffsetDateTime;

const SEPARATOR: &str = "----------------------------------------";

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub max_keywords: usize,
    pub max_links: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { max_keywords: 10, max_links: 10 }
    }
}

/// `yyyy-MM-dd HH:mm:ss` in UTC, or `Unknown` for a missing timestamp.
pub fn format_timestamp(epoch_millis: i64) -> String {
    if epoch_millis <= 0 {
        return "Unknown".to_string();
    }
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos(epoch_millis as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&format).ok())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// `word freq; word freq` for the top keywords of a page.
pub fn format_keywords(keywords: &[(String, u32)]) -> String {
    keywords
        .iter()
        .map(|(word, freq)| format!("{word} {freq}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Write one block per indexed page: title, url, date and size, keywords, child links.
pub fn write_report<W: Write>(store: &IndexStore, out: &mut W, options: &ReportOptions) -> Result<usize> {
    let mut written = 0;
    for page_id in store.all_page_ids()? {
        let Some(page) = store.page(page_id)? else { continue };
        writeln!(out, "{}", page.display_title())?;
        writeln!(out, "{}", page.url)?;
        writeln!(out, "{}, {} bytes", format_timestamp(page.last_modified), page.size)?;

        let keywords = store.top_keywords(page_id, options.max_keywords)?;
        if keywords.is_empty() {
            writeln!(out, "No keywords")?;
        } else {
            writeln!(out, "{}", format_keywords(&keywords))?;
        }

        for child_id in page.child_ids.iter().take(options.max_links) {
            if let Some(child) = store.page(*child_id)? {
                writeln!(out, "{}", child.url)?;
            }
        }
        writeln!(out, "{SEPARATOR}")?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::Field;

    #[test]
    fn formats_dates() {
        assert_eq!(format_timestamp(0), "Unknown");
        assert_eq!(format_timestamp(784_111_777_000), "1994-11-06 08:49:37");
    }

    #[test]
    fn writes_one_block_per_page() {
        let store = IndexStore::temporary().unwrap();
        let root = store.add_page("https://site.test/", "Home", 784_111_777_000, 512).unwrap();
        let child = store.add_page("https://site.test/a", "", 0, 0).unwrap();
        store.add_child_edge(root, child).unwrap();
        let body: Vec<String> = ["crab", "shell", "crab"].iter().map(|s| s.to_string()).collect();
        store.index_field(root, Field::Body, &body).unwrap();

        let mut out = Vec::new();
        let n = write_report(&store, &mut out, &ReportOptions::default()).unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            &lines[..6],
            &[
                "Home",
                "https://site.test/",
                "1994-11-06 08:49:37, 512 bytes",
                "crab 2; shell 1",
                "https://site.test/a",
                SEPARATOR,
            ]
        );
        assert_eq!(&lines[6..], &["https://site.test/a", "https://site.test/a", "Unknown, 0 bytes", "No keywords", SEPARATOR]);
    }
}
