//! UN Press collector, walking the paginated site search.
//!
//! The search is sorted newest-first by document date, so the walk reads
//! pages until it has enough candidates or the listing goes stale. Dated
//! rows older than the cutoff are skipped where they stand; a page whose
//! dated rows are all stale counts toward an early stop, but only two
//! stale pages in a row end the walk, because UN listings are only loosely
//! date-ordered near the boundary. Undated rows are kept as candidates for
//! the downstream date resolver.

use crate::config::RunContext;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::models::{RawItem, SourceTag, find_iso_date};
use crate::utils::{canonical_url, collapse_ws};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

const SITE: &str = "https://press.un.org";
const SEARCH_BASE: &str = "https://press.un.org/en/sitesearch";

/// Sanity limit so a never-stale listing cannot loop forever. Not exposed
/// in the params file.
const MAX_LIST_PAGES: usize = 20;

#[derive(Debug)]
struct ListingRow {
    title: String,
    url: String,
    published: Option<NaiveDate>,
}

/// Walk the site search for `country` and return up to `LIMIT_UN`
/// candidates: dated rows on/after the cutoff plus undated rows.
#[instrument(level = "info", skip_all, fields(country = %country))]
pub async fn search<F: Fetch>(
    fetch: &F,
    country: &str,
    ctx: &RunContext,
) -> Result<Vec<RawItem>, FetchError> {
    let cap = ctx.limit_un;
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut candidates: Vec<ListingRow> = Vec::new();
    let mut stale_streak = 0usize;
    let mut page = 1usize;

    while candidates.len() < cap && page <= MAX_LIST_PAGES && stale_streak < 2 {
        let url = list_url(country, page);
        let html = match fetch.get(&url).await {
            Ok(html) => html,
            Err(e) if page == 1 => return Err(e),
            Err(e) => {
                warn!(page, error = %e, "Listing page fetch failed; stopping walk");
                break;
            }
        };
        let rows = parse_listing(&html);
        if rows.is_empty() {
            debug!(page, "Listing page had no rows; stopping walk");
            break;
        }

        let mut page_has_dated = false;
        let mut page_has_fresh = false;
        for row in rows {
            let key = (row.title.to_lowercase(), canonical_url(&row.url));
            if !seen.insert(key) {
                continue;
            }
            if let Some(published) = row.published {
                page_has_dated = true;
                if published < ctx.cutoff {
                    continue;
                }
                page_has_fresh = true;
            }
            candidates.push(row);
            if candidates.len() >= cap {
                break;
            }
        }
        stale_streak = if page_has_dated && !page_has_fresh {
            stale_streak + 1
        } else {
            0
        };
        page += 1;
    }

    let mut items = Vec::with_capacity(candidates.len());
    for row in candidates {
        let body = if ctx.fulltext {
            match fetch.get(&row.url).await {
                Ok(article) => extract_body(&article),
                Err(e) => {
                    warn!(url = %row.url, error = %e, "Release body fetch failed; keeping listing entry");
                    None
                }
            }
        } else {
            None
        };
        items.push(RawItem {
            source: SourceTag::UnPress,
            title: row.title,
            url: row.url,
            published: row.published,
            body,
        });
    }
    info!(count = items.len(), pages = page - 1, "UN Press walk complete");
    Ok(items)
}

/// Build a listing URL. The first page has no `page` param; the second is
/// `page=1`, the third `page=2`, and so on. Hyphens and underscores in the
/// country become spaces so slug-style names still match.
pub fn list_url(country: &str, page: usize) -> String {
    let term = country.replace(['-', '_'], " ");
    let query = format!(
        "search_api_fulltext={}&sort_by=field_dated",
        urlencoding::encode(term.trim())
    );
    if page <= 1 {
        format!("{SEARCH_BASE}?{query}")
    } else {
        format!("{SEARCH_BASE}?{query}&page={}", page - 1)
    }
}

/// Parse one listing page into rows, listing order preserved.
fn parse_listing(html: &str) -> Vec<ListingRow> {
    let document = Html::parse_document(html);
    let primary = Selector::parse("article.node--view-mode-search-results").unwrap();
    let fallback = Selector::parse("article.node").unwrap();
    let anchor_sel = Selector::parse("a[href]").unwrap();
    let time_sel = Selector::parse("time").unwrap();

    let mut blocks: Vec<ElementRef> = document.select(&primary).collect();
    if blocks.is_empty() {
        blocks = document.select(&fallback).collect();
    }

    let mut seen_urls = HashSet::new();
    let mut rows = Vec::new();
    for block in blocks {
        let Some(anchor) = block.select(&anchor_sel).next() else {
            continue;
        };
        let href = anchor.value().attr("href").unwrap_or_default();
        if href.is_empty() {
            continue;
        }
        let url = if href.starts_with('/') {
            format!("{SITE}{href}")
        } else {
            href.to_string()
        };
        if !seen_urls.insert(url.clone()) {
            continue;
        }
        let title = collapse_ws(&anchor.text().collect::<Vec<_>>().join(" "));
        if title.is_empty() {
            continue;
        }

        let published = match block.select(&time_sel).next() {
            Some(time_el) => {
                let raw = time_el
                    .value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| collapse_ws(&time_el.text().collect::<Vec<_>>().join(" ")));
                find_iso_date(&raw)
            }
            // Occasional "DD Month YYYY" embedded in the row text.
            None => long_form_date(&collapse_ws(&block.text().collect::<Vec<_>>().join(" "))),
        };
        rows.push(ListingRow {
            title,
            url,
            published,
        });
    }
    rows
}

static LONG_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s+([A-Za-z]{3,9})\s+(\d{4})").expect("valid regex"));

fn long_form_date(text: &str) -> Option<NaiveDate> {
    let caps = LONG_DATE.captures(text)?;
    let normalized = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&normalized, "%d %B %Y")
        .or_else(|_| NaiveDate::parse_from_str(&normalized, "%d %b %Y"))
        .ok()
}

/// Extract the release body: the Drupal body field when present, otherwise
/// the article element, otherwise any paragraph on the page. Paragraphs
/// stop at the standard "For information media" footer.
fn extract_body(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let p_sel = Selector::parse("p").unwrap();

    let mut paragraphs: Option<Vec<String>> = None;
    for raw_selector in [
        "div.field--name-body",
        "div[property='content:encoded']",
        "article",
    ] {
        let selector = Selector::parse(raw_selector).unwrap();
        if let Some(container) = document.select(&selector).next() {
            paragraphs = Some(
                container
                    .select(&p_sel)
                    .map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")))
                    .collect(),
            );
            break;
        }
    }
    let paragraphs = paragraphs.unwrap_or_else(|| {
        document
            .select(&p_sel)
            .map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")))
            .collect()
    });

    let mut lines = Vec::new();
    for text in paragraphs {
        if text.to_lowercase().starts_with("for information media") {
            break;
        }
        if !text.is_empty() {
            lines.push(text);
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stubs::MapFetch;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn listing_page(rows: &[(&str, &str, Option<&str>)]) -> String {
        let mut html = String::from("<html><body>");
        for (title, href, date) in rows {
            html.push_str(r#"<article class="node node--view-mode-search-results">"#);
            html.push_str(&format!(r#"<h3><a href="{href}">{title}</a></h3>"#));
            if let Some(date) = date {
                html.push_str(&format!(r#"<time datetime="{date}T12:00:00Z">{date}</time>"#));
            }
            html.push_str("</article>");
        }
        html.push_str("</body></html>");
        html
    }

    #[test]
    fn list_url_page_math() {
        let first = list_url("bosnia-and-herzegovina", 1);
        assert_eq!(
            first,
            "https://press.un.org/en/sitesearch?search_api_fulltext=bosnia%20and%20herzegovina&sort_by=field_dated"
        );
        let third = list_url("Fiji", 3);
        assert!(third.ends_with("&page=2"));
        assert!(!list_url("Fiji", 1).contains("page="));
    }

    #[test]
    fn listing_rows_resolve_paths_and_dates() {
        let html = listing_page(&[
            ("Security Council hears Fiji briefing", "/en/2025/sc123.doc.htm", Some("2025-08-26")),
            ("Older statement", "https://press.un.org/en/2025/sg100.doc.htm", None),
        ]);
        let rows = parse_listing(&html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "https://press.un.org/en/2025/sc123.doc.htm");
        assert_eq!(rows[0].published, NaiveDate::from_ymd_opt(2025, 8, 26));
        assert_eq!(rows[1].published, None);
    }

    #[test]
    fn listing_reads_long_form_dates() {
        let html = r#"<html><body><article class="node">
            <a href="/en/2025/dsgsm.doc.htm">Deputy Secretary-General remarks</a>
            <span>26 August 2025</span>
            </article></body></html>"#;
        let rows = parse_listing(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].published, NaiveDate::from_ymd_opt(2025, 8, 26));
    }

    #[test]
    fn body_stops_at_media_footer() {
        let html = r#"<html><body><div class="field--name-body">
            <p>The Security Council today extended the mandate.</p>
            <p>Delegates welcomed the report.</p>
            <p>For information media. Not an official record.</p>
            <p>Trailing junk.</p>
            </div></body></html>"#;
        let body = extract_body(html).unwrap();
        assert_eq!(
            body,
            "The Security Council today extended the mandate.\n\nDelegates welcomed the report."
        );
    }

    #[tokio::test]
    async fn walk_tolerates_one_stale_page() {
        // Page 2 is entirely pre-cutoff, page 3 has a fresh item again:
        // the walk must read past the stale page and keep the fresh item.
        let mut pages = HashMap::new();
        pages.insert(
            list_url("Fiji", 1),
            listing_page(&[("Fresh one", "/en/1", Some("2025-08-26"))]),
        );
        pages.insert(
            list_url("Fiji", 2),
            listing_page(&[("Stale", "/en/2", Some("2025-08-01"))]),
        );
        pages.insert(
            list_url("Fiji", 3),
            listing_page(&[("Fresh two", "/en/3", Some("2025-08-27"))]),
        );
        pages.insert(
            list_url("Fiji", 4),
            listing_page(&[("Stale a", "/en/4", Some("2025-08-02"))]),
        );
        pages.insert(
            list_url("Fiji", 5),
            listing_page(&[("Stale b", "/en/5", Some("2025-08-03"))]),
        );
        pages.insert(
            list_url("Fiji", 6),
            listing_page(&[("Never reached", "/en/6", Some("2025-08-28"))]),
        );
        let fetch = MapFetch::new(pages);

        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::for_tests(tmp.path());
        let items = search(&fetch, "Fiji", &ctx).await.unwrap();

        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh one", "Fresh two"]);
        // Two consecutive stale pages (4 and 5) end the walk before page 6.
        assert!(!fetch.fetched().contains(&list_url("Fiji", 6)));
        assert!(fetch.fetched().contains(&list_url("Fiji", 3)));
    }

    #[tokio::test]
    async fn walk_stops_at_cap_and_dedupes() {
        let mut pages = HashMap::new();
        pages.insert(
            list_url("Fiji", 1),
            listing_page(&[
                ("A", "/en/a", Some("2025-08-27")),
                ("A", "/en/a", Some("2025-08-27")),
                ("B", "/en/b", None),
                ("C", "/en/c", Some("2025-08-26")),
            ]),
        );
        let fetch = MapFetch::new(pages);

        let tmp = TempDir::new().unwrap();
        let mut ctx = RunContext::for_tests(tmp.path());
        ctx.limit_un = 2;
        let items = search(&fetch, "Fiji", &ctx).await.unwrap();

        // Duplicate dropped, undated candidate kept, cap enforced.
        let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(items[1].published, None);
        // Cap reached on page 1, page 2 never requested.
        assert_eq!(fetch.fetched().len(), 1);
    }

    #[tokio::test]
    async fn first_page_failure_is_a_source_failure() {
        let fetch = MapFetch::new(HashMap::new());
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::for_tests(tmp.path());
        let err = search(&fetch, "Fiji", &ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }
}
