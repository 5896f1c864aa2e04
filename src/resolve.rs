//! Publication-date resolution for undated listing rows.
//!
//! Listings usually carry a date per row, but UN search results sometimes
//! do not. Undated candidates get one secondary fetch of the article page
//! to look for a date there. Those fetches are metered by a per-source
//! budget that grows logarithmically with the item cap, so a large cap
//! cannot turn into a large number of extra requests. An undated item
//! whose page also yields no date is dropped rather than guessed at.

use crate::error::DateResolutionFailure;
use crate::fetch::Fetch;
use crate::models::{RawItem, ResolvedItem, find_iso_date};
use crate::utils::collapse_ws;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Meters secondary fetches while resolving one source's candidate list.
#[derive(Debug)]
pub struct DateResolver {
    budget: usize,
}

impl DateResolver {
    pub fn new(cap: usize) -> Self {
        Self {
            budget: secondary_fetch_budget(cap),
        }
    }

    /// Remaining secondary fetches.
    pub fn remaining(&self) -> usize {
        self.budget
    }

    /// Resolve one candidate. Dated items pass through without any fetch
    /// and without touching the budget.
    pub async fn resolve<F: Fetch>(
        &mut self,
        fetch: &F,
        item: RawItem,
    ) -> Result<ResolvedItem, DateResolutionFailure> {
        if let Some(published) = item.published {
            return Ok(item.resolved(published));
        }
        if self.budget == 0 {
            debug!(url = %item.url, "Date fetch budget exhausted; dropping undated item");
            return Err(DateResolutionFailure {
                url: item.url.clone(),
            });
        }
        self.budget -= 1;
        let html = match fetch.get(&item.url).await {
            Ok(html) => html,
            Err(e) => {
                debug!(url = %item.url, error = %e, "Date fetch failed; dropping undated item");
                return Err(DateResolutionFailure {
                    url: item.url.clone(),
                });
            }
        };
        match extract_publish_date(&html) {
            Some(published) => Ok(item.resolved(published)),
            None => Err(DateResolutionFailure {
                url: item.url.clone(),
            }),
        }
    }
}

/// ceil(log2(cap)) with a floor of one fetch, so caps of 2, 5, and 32 give
/// budgets of 1, 3, and 5.
pub fn secondary_fetch_budget(cap: usize) -> usize {
    let cap = cap.max(2) as f64;
    (cap.log2().ceil() as usize).max(1)
}

/// Resolve every candidate in `items`, drop anything still undated or
/// older than `cutoff`, and trim the survivors to `cap`.
pub async fn resolve_and_trim<F: Fetch>(
    fetch: &F,
    items: Vec<RawItem>,
    cap: usize,
    cutoff: NaiveDate,
) -> Vec<ResolvedItem> {
    let mut resolver = DateResolver::new(cap);
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        match resolver.resolve(fetch, item).await {
            Ok(resolved) => {
                if keeps_cutoff(&resolved, cutoff) {
                    kept.push(resolved);
                } else {
                    debug!(url = %resolved.url, published = %resolved.published, "Dropping pre-cutoff item");
                }
            }
            Err(e) => warn!(url = %e.url, "Dropping undated item"),
        }
    }
    kept.truncate(cap);
    kept
}

/// Items dated exactly on the cutoff stay in.
pub fn keeps_cutoff(item: &ResolvedItem, cutoff: NaiveDate) -> bool {
    item.published >= cutoff
}

/// Pull a publication date out of an article page: a `<time datetime>`
/// attribute first, then `<time>` text, then the usual meta tags.
fn extract_publish_date(html: &str) -> Option<NaiveDate> {
    let document = Html::parse_document(html);

    let time_sel = Selector::parse("time").expect("valid selector");
    for time_el in document.select(&time_sel) {
        if let Some(datetime) = time_el.value().attr("datetime") {
            if let Some(date) = find_iso_date(datetime) {
                return Some(date);
            }
        }
        let text = collapse_ws(&time_el.text().collect::<Vec<_>>().join(" "));
        if let Some(date) = find_iso_date(&text) {
            return Some(date);
        }
    }

    for raw_selector in [
        "meta[property='article:published_time']",
        "meta[name='date']",
        "meta[name='pubdate']",
    ] {
        let selector = Selector::parse(raw_selector).expect("valid selector");
        if let Some(meta) = document.select(&selector).next() {
            if let Some(content) = meta.value().attr("content") {
                if let Some(date) = find_iso_date(content) {
                    return Some(date);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::stubs::MapFetch;
    use crate::models::SourceTag;
    use std::collections::HashMap;

    fn undated(url: &str) -> RawItem {
        RawItem {
            source: SourceTag::UnPress,
            title: "An undated release".into(),
            url: url.into(),
            published: None,
            body: None,
        }
    }

    fn dated(url: &str, date: NaiveDate) -> RawItem {
        RawItem {
            published: Some(date),
            ..undated(url)
        }
    }

    #[test]
    fn budget_grows_logarithmically() {
        assert_eq!(secondary_fetch_budget(0), 1);
        assert_eq!(secondary_fetch_budget(2), 1);
        assert_eq!(secondary_fetch_budget(5), 3);
        assert_eq!(secondary_fetch_budget(8), 3);
        assert_eq!(secondary_fetch_budget(32), 5);
    }

    #[tokio::test]
    async fn dated_items_pass_through_without_fetching() {
        let fetch = MapFetch::new(HashMap::new());
        let mut resolver = DateResolver::new(8);
        let date = NaiveDate::from_ymd_opt(2025, 8, 26).unwrap();
        let resolved = resolver.resolve(&fetch, dated("https://a/x", date)).await.unwrap();
        assert_eq!(resolved.published, date);
        assert_eq!(resolver.remaining(), 3);
        assert!(fetch.fetched().is_empty());
    }

    #[tokio::test]
    async fn undated_item_gets_one_secondary_fetch() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://press.un.org/en/2025/x.doc.htm".to_string(),
            r#"<html><body><time datetime="2025-08-27T09:00:00Z">27 Aug</time></body></html>"#
                .to_string(),
        );
        let fetch = MapFetch::new(pages);
        let mut resolver = DateResolver::new(8);
        let resolved = resolver
            .resolve(&fetch, undated("https://press.un.org/en/2025/x.doc.htm"))
            .await
            .unwrap();
        assert_eq!(resolved.published, NaiveDate::from_ymd_opt(2025, 8, 27).unwrap());
        assert_eq!(resolver.remaining(), 2);
        assert_eq!(fetch.fetched().len(), 1);
    }

    #[tokio::test]
    async fn meta_tags_are_a_fallback() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://a/x".to_string(),
            r#"<html><head><meta property="article:published_time" content="2025-09-01T00:00:00Z"></head></html>"#
                .to_string(),
        );
        let fetch = MapFetch::new(pages);
        let mut resolver = DateResolver::new(2);
        let resolved = resolver.resolve(&fetch, undated("https://a/x")).await.unwrap();
        assert_eq!(resolved.published, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
    }

    #[tokio::test]
    async fn exhausted_budget_drops_undated_items() {
        let fetch = MapFetch::new(HashMap::new());
        let mut resolver = DateResolver::new(2);
        // First undated item spends the single fetch (and fails on 404).
        assert!(resolver.resolve(&fetch, undated("https://a/1")).await.is_err());
        assert_eq!(resolver.remaining(), 0);
        // Second is dropped without any request.
        assert!(resolver.resolve(&fetch, undated("https://a/2")).await.is_err());
        assert_eq!(fetch.fetched().len(), 1);
    }

    #[tokio::test]
    async fn trim_applies_cutoff_inclusively_and_caps() {
        let fetch = MapFetch::new(HashMap::new());
        let cutoff = NaiveDate::from_ymd_opt(2025, 8, 25).unwrap();
        let items = vec![
            dated("https://a/1", NaiveDate::from_ymd_opt(2025, 8, 27).unwrap()),
            dated("https://a/2", cutoff),
            dated("https://a/3", NaiveDate::from_ymd_opt(2025, 8, 24).unwrap()),
            dated("https://a/4", NaiveDate::from_ymd_opt(2025, 8, 26).unwrap()),
            undated("https://a/5"),
        ];
        let kept = resolve_and_trim(&fetch, items, 2, cutoff).await;
        // The day-before item and the unresolvable one are gone; the cap
        // then keeps the first two survivors in listing order.
        let urls: Vec<_> = kept.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/1", "https://a/2"]);
    }
}
