//! Utility functions for string normalization, URL canonicalization, and
//! file system checks.
//!
//! Helpers used throughout the application:
//! - Country slugification and the inverse title-casing for aggregates
//! - URL canonicalization for dedup keys
//! - String truncation and JSON truncation detection for LLM replies
//! - File system validation for output directories

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Convert a country name to its artifact file key.
///
/// Lowercases the text, replaces every run of non-alphanumeric characters
/// with a single hyphen, and strips edge hyphens. An all-symbol input falls
/// back to `"x"` so a file name always exists.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("United States"), "united-states");
/// assert_eq!(slugify("Côte d'Ivoire"), "c-te-d-ivoire");
/// ```
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "x".to_string()
    } else {
        out
    }
}

/// Turn an artifact file key back into a display heading.
///
/// Hyphens and underscores become spaces and each word is title-cased.
/// Used for the country headers in the `all_emails` aggregate.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slug_to_title("united-states"), "United States");
/// ```
pub fn slug_to_title(slug: &str) -> String {
    slug.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce a URL to `scheme://host/path` for use as a dedup key.
///
/// Query strings and fragments carry tracking noise, so two listings of the
/// same article compare equal after canonicalization. Unparseable input is
/// returned trimmed rather than dropped.
pub fn canonical_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(parsed) => {
            let mut out = format!("{}://", parsed.scheme());
            out.push_str(parsed.host_str().unwrap_or_default());
            if let Some(port) = parsed.port() {
                out.push_str(&format!(":{port}"));
            }
            out.push_str(parsed.path());
            out
        }
        Err(_) => raw.trim().to_string(),
    }
}

/// Collapse internal whitespace runs to single spaces and trim the edges.
///
/// Scraped anchor text often arrives with nested-element line breaks.
pub fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Count whitespace-delimited words, the measure used for email word bounds.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes with an ellipsis and byte
/// count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…(+{} bytes)", &s[..end], s.len() - end)
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When an LLM reply is cut off mid-object (token limits, dropped
/// connection), parsing fails with an EOF error. Those replies are worth
/// exactly one re-ask; any other parse failure is not.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Small sync probe write using std fs (simpler error surface)
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Run directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("United States"), "united-states");
        assert_eq!(slugify("Bosnia and Herzegovina"), "bosnia-and-herzegovina");
        assert_eq!(slugify("Côte d'Ivoire"), "c-te-d-ivoire");
        assert_eq!(slugify("  Fiji  "), "fiji");
        assert_eq!(slugify("!!!"), "x");
        assert_eq!(slugify(""), "x");
    }

    #[test]
    fn test_slug_to_title() {
        assert_eq!(slug_to_title("united-states"), "United States");
        assert_eq!(slug_to_title("fiji"), "Fiji");
        assert_eq!(slug_to_title("lao_pdr"), "Lao Pdr");
    }

    #[test]
    fn test_canonical_url_strips_query_and_fragment() {
        assert_eq!(
            canonical_url("https://www.aljazeera.com/news/2025/8/20/story?utm_source=x#top"),
            "https://www.aljazeera.com/news/2025/8/20/story"
        );
        assert_eq!(
            canonical_url("https://press.un.org/en/2025/sc123.doc.htm"),
            "https://press.un.org/en/2025/sc123.doc.htm"
        );
    }

    #[test]
    fn test_canonical_url_keeps_unparseable_input() {
        assert_eq!(canonical_url("  not a url  "), "not a url");
    }

    #[test]
    fn test_collapse_ws() {
        assert_eq!(collapse_ws("  a \n  b\tc "), "a b c");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("one two  three\nfour"), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "日本語のテキストです";
        let result = truncate_for_log(s, 4);
        assert!(result.contains("…(+"));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#; // Missing closing brace
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        if let Err(e) = result {
            assert!(looks_truncated(&e));
        }
        let json_garbage = "not json at all";
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_garbage);
        if let Err(e) = result {
            assert!(!looks_truncated(&e));
        }
    }
}
