//! Al Jazeera collector, scraping the `/where/<country>/` tag page.
//!
//! The tag page is a single listing of cards, newest first; article URLs
//! carry a numeric `/YYYY/M/D/` segment, so most items arrive with a date
//! and never need the resolver. Full-text runs fetch each article page and
//! extract the body through a ladder: JSON-LD first, then known body
//! containers, then any paragraph on the page.

use crate::config::RunContext;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::models::{RawItem, SourceTag};
use crate::utils::{collapse_ws, word_count};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, instrument, warn};

const SITE: &str = "https://www.aljazeera.com";

/// Body containers in descending order of specificity. The bare `article`
/// tag last, as a catch-all.
const BODY_SELECTORS: [&str; 8] = [
    "article [data-component='article-body']",
    "article .wysiwyg",
    "article .article-p-wrapper",
    "article .article-body",
    "article .article__body",
    "article .longform-body",
    "article [itemprop='articleBody']",
    "article",
];

static DATE_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/20(\d{2})/(\d{1,2})/(\d{1,2})/").expect("valid regex"));

#[derive(Debug)]
struct ListingEntry {
    title: String,
    url: String,
    published: Option<NaiveDate>,
}

/// Fetch recent Al Jazeera items from the country's tag page.
#[instrument(level = "info", skip_all, fields(country = %country))]
pub async fn where_recent<F: Fetch>(
    fetch: &F,
    country: &str,
    ctx: &RunContext,
) -> Result<Vec<RawItem>, FetchError> {
    let listing_url = format!("{SITE}/where/{}/", urlencoding::encode(country));
    let html = fetch.get(&listing_url).await?;
    let entries = parse_listing(&html, ctx.limit_aljazeera);

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let body = if ctx.fulltext {
            match fetch.get(&entry.url).await {
                Ok(page) => extract_body(&page),
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Article body fetch failed; keeping listing entry");
                    None
                }
            }
        } else {
            None
        };
        items.push(RawItem {
            source: SourceTag::PressAljazeera,
            title: entry.title,
            url: entry.url,
            published: entry.published,
            body,
        });
    }
    info!(count = items.len(), "Al Jazeera listing complete");
    Ok(items)
}

/// Parse the tag page listing: clickable cards whose resolved URL contains
/// `/news/`, capped at `cap`.
fn parse_listing(html: &str, cap: usize) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let card = Selector::parse("a.u-clickable-card__link").unwrap();
    let base = url::Url::parse(SITE).unwrap();

    let mut entries = Vec::new();
    for anchor in document.select(&card) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let resolved = match base.join(href) {
            Ok(joined) => joined.to_string(),
            Err(_) => continue,
        };
        if !resolved.contains("/news/") {
            continue;
        }
        let title = collapse_ws(&anchor.text().collect::<Vec<_>>().join(" "));
        if title.is_empty() {
            continue;
        }
        let published = date_from_url(&resolved);
        entries.push(ListingEntry {
            title,
            url: resolved,
            published,
        });
        if entries.len() >= cap {
            break;
        }
    }
    entries
}

/// Article URLs embed a short-year numeric date: `/news/2025/8/20/...`.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    let caps = DATE_IN_URL.captures(url)?;
    let year: i32 = caps[1].parse::<i32>().ok()? + 2000;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Best-effort body extraction for an article page.
fn extract_body(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    // 1) JSON-LD, most reliable when present. Keep the longest body (some
    //    pages carry a short `text` alongside the full `articleBody`).
    if let Some(best) = jsonld_article_body(&document) {
        if word_count(&best) > 40 {
            return Some(best);
        }
    }

    // 2) Known body containers.
    let p_selector = Selector::parse("p").unwrap();
    for selector in BODY_SELECTORS {
        let selector = Selector::parse(selector).unwrap();
        let containers: Vec<_> = document.select(&selector).collect();
        if containers.is_empty() {
            continue;
        }
        let paragraphs = containers
            .iter()
            .flat_map(|container| container.select(&p_selector))
            .map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")));
        let cleaned = clean_paragraphs(paragraphs);
        if !cleaned.is_empty() {
            return Some(cleaned.join("\n\n"));
        }
    }

    // 3) Last resort: any paragraph on the page.
    let paragraphs = document
        .select(&p_selector)
        .map(|p| collapse_ws(&p.text().collect::<Vec<_>>().join(" ")));
    let cleaned = clean_paragraphs(paragraphs);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n\n"))
    }
}

/// Pull `articleBody`/`text` out of JSON-LD blocks for article-like types.
fn jsonld_article_body(document: &Html) -> Option<String> {
    let script = Selector::parse("script[type='application/ld+json']").unwrap();
    let mut bodies: Vec<String> = Vec::new();
    for block in document.select(&script) {
        let raw = block.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
            continue;
        };
        let objects: Vec<&serde_json::Value> = match &data {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for object in objects {
            let is_article = object
                .get("@type")
                .and_then(|t| t.as_str())
                .map(|t| matches!(t, "NewsArticle" | "Article" | "Report"))
                .unwrap_or(false);
            if !is_article {
                continue;
            }
            let body = object
                .get("articleBody")
                .or_else(|| object.get("text"))
                .and_then(|b| b.as_str())
                .map(str::trim)
                .unwrap_or_default();
            if !body.is_empty() {
                bodies.push(body.to_string());
            }
        }
    }
    bodies.into_iter().max_by_key(String::len)
}

/// Drop boilerplate and duplicate paragraphs.
fn clean_paragraphs(paragraphs: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for text in paragraphs {
        if text.is_empty() {
            continue;
        }
        let low = text.to_lowercase();
        if low.contains("sign up for") && low.contains("newsletter") {
            continue;
        }
        if low.starts_with("follow al jazeera")
            || low.starts_with("recommended stories")
            || low.starts_with("source: al jazeera")
        {
            continue;
        }
        if !seen.insert(text.clone()) {
            continue;
        }
        out.push(text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
        <a class="u-clickable-card__link" href="/news/2025/8/26/fiji-storm-recovery">
            <span>Fiji  begins storm
            recovery</span>
        </a>
        <a class="u-clickable-card__link" href="/program/2025/8/20/fiji-documentary">Documentary</a>
        <a class="u-clickable-card__link" href="https://www.aljazeera.com/news/2025/8/19/fiji-trade-talks">Fiji trade talks</a>
        <a class="u-clickable-card__link" href="/news/undated/fiji-profile">Country profile</a>
    </body></html>"#;

    #[test]
    fn listing_keeps_news_links_and_resolves_relative_urls() {
        let entries = parse_listing(LISTING, 10);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].url,
            "https://www.aljazeera.com/news/2025/8/26/fiji-storm-recovery"
        );
        assert_eq!(entries[0].title, "Fiji begins storm recovery");
        assert_eq!(
            entries[0].published,
            NaiveDate::from_ymd_opt(2025, 8, 26)
        );
        // No date segment in the URL: left for the resolver.
        assert_eq!(entries[2].published, None);
    }

    #[test]
    fn listing_respects_cap() {
        let entries = parse_listing(LISTING, 1);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn url_date_uses_short_year() {
        assert_eq!(
            date_from_url("https://www.aljazeera.com/news/2025/8/3/x"),
            NaiveDate::from_ymd_opt(2025, 8, 3)
        );
        assert_eq!(date_from_url("https://www.aljazeera.com/news/x"), None);
    }

    #[test]
    fn jsonld_body_wins_when_long_enough() {
        let words = (0..60).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let html = format!(
            r#"<html><head>
            <script type="application/ld+json">{{"@type":"NewsArticle","articleBody":"{words}"}}</script>
            </head><body><article><p>ignored container text</p></article></body></html>"#
        );
        let body = extract_body(&html).unwrap();
        assert!(body.starts_with("word0 "));
        assert_eq!(word_count(&body), 60);
    }

    #[test]
    fn short_jsonld_falls_through_to_containers() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type":"NewsArticle","articleBody":"too short"}</script>
            </head><body><article class="article-body"><div class="wysiwyg">
            <p>First real paragraph of the story.</p>
            <p>Sign up for our newsletter today</p>
            <p>Second paragraph with substance.</p>
            <p>Second paragraph with substance.</p>
            <p>Source: Al Jazeera and agencies</p>
            </div></article></body></html>"#;
        let body = extract_body(html).unwrap();
        assert_eq!(
            body,
            "First real paragraph of the story.\n\nSecond paragraph with substance."
        );
    }

    #[test]
    fn empty_page_yields_no_body() {
        assert_eq!(extract_body("<html><body></body></html>"), None);
    }
}
