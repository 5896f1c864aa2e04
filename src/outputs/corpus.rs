//! The per-country text artifact: render, section upsert, and parse-back.
//!
//! One file per country holds the fused corpus in a fixed plain-text
//! layout:
//!
//! ```text
//! Country: Fiji | Cutoff: 2025-08-25
//!
//! [PRESS]
//! 1) Title — The Guardian (2025-08-26)
//!    URL: https://...
//!    Text:
//!      First paragraph.
//!      Second paragraph.
//!
//! [UN]
//! No UN results found.
//! ```
//!
//! Sections are upserted independently: re-running a source's phase
//! replaces exactly its own section, leaving the header and every other
//! section untouched. Upserting identical content is byte-stable. The
//! drafting phase parses the file back into a [`FusedCorpus`], which makes
//! the artifact the durable handoff between the two phases.

use crate::error::PipelineError;
use crate::models::{CorpusSection, FusedCorpus, ResolvedItem, Section, find_iso_date};
use crate::utils::canonical_url;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

fn header_line(country: &str, cutoff: NaiveDate) -> String {
    format!("Country: {country} | Cutoff: {cutoff}")
}

fn is_heading(line: &str) -> bool {
    Section::ORDER.iter().any(|s| line == s.heading())
}

/// Render one section block, without a trailing newline.
fn render_section(section: Section, items: &[ResolvedItem]) -> String {
    let mut out = String::new();
    out.push_str(section.heading());
    if items.is_empty() {
        write!(out, "\nNo {} results found.", section.label()).unwrap();
        return out;
    }
    for (i, item) in items.iter().enumerate() {
        let title = html_escape::decode_html_entities(item.title.trim());
        write!(
            out,
            "\n{}) {} — {} ({})",
            i + 1,
            title,
            item.source.label(),
            item.published
        )
        .unwrap();
        write!(out, "\n   URL: {}", item.url).unwrap();
        if let Some(body) = &item.body {
            out.push_str("\n   Text:");
            for para in body.lines() {
                let para = para.trim();
                if !para.is_empty() {
                    write!(out, "\n     {para}").unwrap();
                }
            }
        }
        if i + 1 < items.len() {
            out.push('\n');
        }
    }
    out
}

/// Render a whole corpus in canonical form: header, then every section in
/// fixed order, one blank line between blocks, trailing newline.
pub fn render(corpus: &FusedCorpus) -> String {
    let mut parts = vec![header_line(&corpus.country, corpus.cutoff)];
    for section in Section::ORDER {
        parts.push(render_section(section, corpus.section_items(section)));
    }
    let mut text = parts.join("\n\n");
    text.push('\n');
    text
}

/// Splice one rendered section into an existing file's text.
///
/// The section's region runs from its heading line to the line before the
/// next heading (or EOF). A section not yet present is appended, so the
/// file records insertion history; parsing normalizes back to fixed order.
fn replace_section(text: &str, section: Section, rendered: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 8);

    match lines.iter().position(|l| *l == section.heading()) {
        Some(start) => {
            let end = lines[start + 1..]
                .iter()
                .position(|l| is_heading(l))
                .map(|p| start + 1 + p)
                .unwrap_or(lines.len());
            out.extend(&lines[..start]);
            out.extend(rendered.lines());
            if end < lines.len() {
                out.push("");
                out.extend(&lines[end..]);
            }
        }
        None => {
            out.extend(&lines[..]);
            out.push("");
            out.extend(rendered.lines());
        }
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Write or replace one section of a country's text artifact.
#[instrument(level = "info", skip_all, fields(country = %country, section = section.index_name(), items = items.len()))]
pub async fn upsert_section(
    path: &Path,
    country: &str,
    cutoff: NaiveDate,
    section: Section,
    items: &[ResolvedItem],
) -> Result<(), PipelineError> {
    let rendered = render_section(section, items);
    let content = match fs::read_to_string(path).await {
        Ok(existing) => replace_section(&existing, section, &rendered),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            format!("{}\n\n{}\n", header_line(country, cutoff), rendered)
        }
        Err(e) => return Err(PipelineError::io(format!("reading {}", path.display()), e)),
    };
    fs::write(path, content)
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
    info!(path = %path.display(), "Corpus section written");
    Ok(())
}

static ITEM_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\)\s+(.+)$").expect("valid regex"));

/// Parse a text artifact back into a [`FusedCorpus`].
///
/// Tolerates insertion-order section layout and stray blank lines; output
/// sections are always in fixed order with cross-section URL dedup applied
/// (press wins). Lines before the first heading other than the header are
/// ignored.
pub fn parse(text: &str, fallback_country: &str, fallback_cutoff: NaiveDate) -> FusedCorpus {
    let mut country = fallback_country.to_string();
    let mut cutoff = fallback_cutoff;
    let mut press: Vec<ResolvedItem> = Vec::new();
    let mut un: Vec<ResolvedItem> = Vec::new();

    let mut current: Option<Section> = None;
    let mut pending: Option<ResolvedItem> = None;
    let mut body_lines: Vec<String> = Vec::new();
    let mut in_text = false;

    fn flush(
        pending: &mut Option<ResolvedItem>,
        body_lines: &mut Vec<String>,
        press: &mut Vec<ResolvedItem>,
        un: &mut Vec<ResolvedItem>,
        section: Option<Section>,
    ) {
        if let Some(mut item) = pending.take() {
            if !body_lines.is_empty() {
                item.body = Some(body_lines.join("\n\n"));
            }
            match section {
                Some(Section::Un) => un.push(item),
                _ => press.push(item),
            }
        }
        body_lines.clear();
    }

    for line in text.lines() {
        if is_heading(line) {
            flush(&mut pending, &mut body_lines, &mut press, &mut un, current);
            in_text = false;
            current = Section::ORDER.iter().copied().find(|s| s.heading() == line);
            continue;
        }
        if let Some(rest) = line.strip_prefix("Country: ") {
            if let Some((name, cut)) = rest.split_once(" | Cutoff: ") {
                country = name.trim().to_string();
                if let Some(date) = find_iso_date(cut) {
                    cutoff = date;
                }
            }
            continue;
        }
        let Some(section) = current else { continue };
        if line.starts_with("No ") && line.ends_with("results found.") {
            continue;
        }
        if let Some(caps) = ITEM_LINE.captures(line) {
            flush(
                &mut pending,
                &mut body_lines,
                &mut press,
                &mut un,
                current,
            );
            in_text = false;
            let rest = &caps[1];
            // "<title> — <label> (<date>)"; the last " — " splits title
            // from attribution so titles containing dashes stay intact.
            let (title, tail) = rest.rsplit_once(" — ").unwrap_or((rest, ""));
            let published = find_iso_date(tail).unwrap_or(cutoff);
            let label = tail
                .rsplit_once(" (")
                .map(|(l, _)| l)
                .unwrap_or(tail)
                .trim();
            let source = crate::models::SourceTag::from_label(label)
                .unwrap_or_else(|| section.default_source());
            pending = Some(ResolvedItem {
                source,
                title: title.trim().to_string(),
                url: String::new(),
                published,
                body: None,
            });
            continue;
        }
        if let Some(url) = line.strip_prefix("   URL: ") {
            if let Some(item) = pending.as_mut() {
                item.url = url.trim().to_string();
            }
            continue;
        }
        if line == "   Text:" {
            in_text = true;
            continue;
        }
        if in_text {
            if let Some(para) = line.strip_prefix("     ") {
                let para = para.trim();
                if !para.is_empty() {
                    body_lines.push(para.to_string());
                }
            }
        }
    }
    flush(&mut pending, &mut body_lines, &mut press, &mut un, current);

    // Cross-section dedup, press first.
    let mut seen: HashSet<String> = HashSet::new();
    press.retain(|item| seen.insert(canonical_url(&item.url)));
    un.retain(|item| seen.insert(canonical_url(&item.url)));
    debug!(
        country = %country,
        press = press.len(),
        un = un.len(),
        "Parsed corpus artifact"
    );

    FusedCorpus {
        country,
        cutoff,
        sections: vec![
            CorpusSection {
                section: Section::Press,
                items: press,
            },
            CorpusSection {
                section: Section::Un,
                items: un,
            },
        ],
    }
}
