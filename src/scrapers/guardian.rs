//! The Guardian collector, backed by the Content API search endpoint.
//!
//! One JSON request per (country, invocation): the country name is the
//! search term, ordered newest-first, page size clamped to the API maximum.
//! With full text enabled the request also asks for `bodyText`, so no
//! second fetch is needed per article.

use crate::config::RunContext;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::models::{RawItem, SourceTag, find_iso_date};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument, warn};

const SEARCH_API: &str = "https://content.guardianapis.com/search";

/// Outer envelope of every Content API response.
#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchResponse,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    web_title: Option<String>,
    web_url: String,
    web_publication_date: Option<String>,
    fields: Option<ResultFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultFields {
    body_text: Option<String>,
}

/// Fetch the most recent Guardian items mentioning `country`.
#[instrument(level = "info", skip_all, fields(country = %country))]
pub async fn recent<F: Fetch>(
    fetch: &F,
    country: &str,
    ctx: &RunContext,
) -> Result<Vec<RawItem>, FetchError> {
    let url = search_url(
        country,
        ctx.limit_guardian,
        ctx.fulltext,
        &ctx.guardian_api_key,
    );
    let body = fetch.get(&url).await?;
    let items = parse_search(&body, ctx.limit_guardian);
    info!(count = items.len(), "Guardian search complete");
    Ok(items)
}

/// Build the Content API query. `page-size` is clamped to the API's 1-50
/// range; full-text runs add `show-fields=bodyText`.
pub fn search_url(country: &str, cap: usize, fulltext: bool, api_key: &str) -> String {
    let page_size = cap.clamp(1, 50);
    let mut url = format!(
        "{SEARCH_API}?q={}&order-by=newest&page-size={page_size}&page=1&api-key={}",
        urlencoding::encode(country),
        urlencoding::encode(api_key),
    );
    if fulltext {
        url.push_str("&show-fields=bodyText");
    }
    url
}

/// Parse a Content API response body into items, newest first.
///
/// A non-JSON body or a non-`ok` API status degrades to an empty list with
/// a warning: the request itself succeeded, so this is not a fetch error.
fn parse_search(body: &str, cap: usize) -> Vec<RawItem> {
    let envelope: SearchEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Guardian response was not valid JSON");
            return Vec::new();
        }
    };
    if envelope.response.status != "ok" {
        warn!(status = %envelope.response.status, "Guardian API status not ok");
        return Vec::new();
    }

    envelope
        .response
        .results
        .into_iter()
        .take(cap)
        .filter_map(|result| {
            let title = result.web_title.unwrap_or_default().trim().to_string();
            if title.is_empty() || result.web_url.is_empty() {
                return None;
            }
            let published = result
                .web_publication_date
                .as_deref()
                .and_then(find_iso_date)
                .or_else(|| date_from_url(&result.web_url));
            let body = result
                .fields
                .and_then(|fields| fields.body_text)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty());
            Some(RawItem {
                source: SourceTag::PressGuardian,
                title,
                url: result.web_url,
                published,
                body,
            })
        })
        .collect()
}

static URL_DATE_NUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(20\d{2})/(\d{1,2})/(\d{1,2})/").expect("valid regex"));
static URL_DATE_TXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(20\d{2})/(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)/(\d{1,2})/")
        .expect("valid regex")
});

/// Guardian article paths embed the publish date, numerically or with a
/// three-letter month (`/world/2025/aug/20/...`). Used as a fallback when
/// the API omits `webPublicationDate`.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    if let Some(caps) = URL_DATE_NUM.captures(url) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let caps = URL_DATE_TXT.captures(url)?;
    let year: i32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
