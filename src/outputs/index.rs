//! The run-level `_index.csv`: one row per (country, section).
//!
//! The index is the run's observability surface: item counts per corpus
//! section plus `info` / `emails` rows from the drafting phase, each with a
//! status of `ok`, `empty`, or a short error note (`fetch_failed`,
//! `cancelled`, `draft_failed`, `skipped`). Writes are merge-rewrites keyed
//! by (country, section), so re-running one phase replaces exactly its own
//! rows and a failed country's note survives later successful phases for
//! its neighbours.

use crate::error::PipelineError;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

const HEADER: &str = "country,section,item_count,status";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub country: String,
    pub section: String,
    pub item_count: usize,
    pub status: String,
}

impl IndexRow {
    pub fn new(
        country: impl Into<String>,
        section: impl Into<String>,
        item_count: usize,
        status: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            section: section.into(),
            item_count,
            status: status.into(),
        }
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line, honoring quoted fields with doubled quotes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => {
                fields.push(std::mem::take(&mut field));
            }
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn parse_row(line: &str) -> Option<IndexRow> {
    let fields = split_line(line);
    if fields.len() != 4 {
        return None;
    }
    Some(IndexRow {
        country: fields[0].clone(),
        section: fields[1].clone(),
        item_count: fields[2].parse().ok()?,
        status: fields[3].clone(),
    })
}

/// Merge `new_rows` into the index file, rewriting it sorted by key.
///
/// Existing rows with the same (country, section) key are replaced; all
/// others are preserved. Callers serialize: the phase drivers write the
/// index only after their per-country join.
pub async fn merge_rows(path: &Path, new_rows: Vec<IndexRow>) -> Result<(), PipelineError> {
    let mut merged: BTreeMap<(String, String), IndexRow> = BTreeMap::new();

    match fs::read_to_string(path).await {
        Ok(existing) => {
            for line in existing.lines().skip(1) {
                if let Some(row) = parse_row(line) {
                    merged.insert((row.country.clone(), row.section.clone()), row);
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(format!("reading {}", path.display()), e)),
    }

    let replaced = new_rows.len();
    for row in new_rows {
        merged.insert((row.country.clone(), row.section.clone()), row);
    }

    let mut out = String::from(HEADER);
    for row in merged.values() {
        out.push('\n');
        out.push_str(&escape(&row.country));
        out.push(',');
        out.push_str(&escape(&row.section));
        out.push(',');
        out.push_str(&row.item_count.to_string());
        out.push(',');
        out.push_str(&escape(&row.status));
    }
    out.push('\n');

    fs::write(path, out)
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
    debug!(rows = replaced, total = merged.len(), "Index rows merged");
    info!(path = %path.display(), "Index written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_the_file_with_header_and_sorted_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("_index.csv");
        merge_rows(
            &path,
            vec![
                IndexRow::new("fiji", "un", 3, "ok"),
                IndexRow::new("fiji", "press", 0, "empty"),
            ],
        )
        .await
        .unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            text,
            "country,section,item_count,status\nfiji,press,0,empty\nfiji,un,3,ok\n"
        );
    }

    #[tokio::test]
    async fn rerunning_a_phase_replaces_only_its_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("_index.csv");
        merge_rows(
            &path,
            vec![
                IndexRow::new("fiji", "press", 2, "ok"),
                IndexRow::new("fiji", "un", 1, "ok"),
            ],
        )
        .await
        .unwrap();
        // Press phase re-runs and now fails; UN row must survive.
        merge_rows(&path, vec![IndexRow::new("fiji", "press", 0, "fetch_failed")])
            .await
            .unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("fiji,press,0,fetch_failed"));
        assert!(text.contains("fiji,un,1,ok"));
    }

    #[tokio::test]
    async fn commas_in_country_names_are_quoted_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("_index.csv");
        merge_rows(
            &path,
            vec![IndexRow::new("Korea, Republic of", "press", 4, "ok")],
        )
        .await
        .unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert!(text.contains("\"Korea, Republic of\",press,4,ok"));

        // A second merge must parse the quoted row rather than duplicate it.
        merge_rows(
            &path,
            vec![IndexRow::new("Korea, Republic of", "press", 5, "ok")],
        )
        .await
        .unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(text.matches("Korea").count(), 1);
        assert!(text.contains("\"Korea, Republic of\",press,5,ok"));
    }

    #[test]
    fn split_line_handles_doubled_quotes() {
        assert_eq!(
            split_line(r#""say ""hi""",press,1,ok"#),
            vec!["say \"hi\"", "press", "1", "ok"]
        );
        assert_eq!(split_line("a,b,2,ok"), vec!["a", "b", "2", "ok"]);
    }
}
