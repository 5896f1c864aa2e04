//! Cross-country aggregates: `all_info` and `all_emails`.
//!
//! Both are rebuilt from scratch after every drafting pass by
//! concatenating the per-country files in slug order. Email blocks get a
//! Title-Cased country header line so a reader scanning the aggregate
//! knows whose outreach they are looking at; info bullets already carry
//! their own attribution and go in headerless.

use crate::error::PipelineError;
use crate::utils::slug_to_title;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

enum Kind {
    Info,
    Emails,
}

/// Rebuild both aggregate files for a run directory.
pub async fn rebuild(run_dir: &Path) -> Result<(), PipelineError> {
    rebuild_one(&run_dir.join("info"), &run_dir.join("all_info"), Kind::Info).await?;
    rebuild_one(
        &run_dir.join("emails"),
        &run_dir.join("all_emails"),
        Kind::Emails,
    )
    .await
}

async fn rebuild_one(src_dir: &Path, out_file: &Path, kind: Kind) -> Result<(), PipelineError> {
    let _ = fs::remove_file(out_file).await;
    if !src_dir.is_dir() {
        debug!(dir = %src_dir.display(), "No source directory; aggregate skipped");
        return Ok(());
    }

    let mut entries = fs::read_dir(src_dir)
        .await
        .map_err(|e| PipelineError::io(format!("reading {}", src_dir.display()), e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(format!("reading {}", src_dir.display()), e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("txt") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut out = String::new();
    for path in &files {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::io(format!("reading {}", path.display()), e))?;
        if let Kind::Emails = kind {
            let slug = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            out.push_str(&slug_to_title(slug));
            out.push('\n');
        }
        out.push_str(content.trim_end());
        out.push_str("\n\n");
    }

    fs::write(out_file, out)
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", out_file.display()), e))?;
    info!(path = %out_file.display(), files = files.len(), "Aggregate rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).await.unwrap();
        fs::write(dir.join(name), content).await.unwrap();
    }

    #[tokio::test]
    async fn emails_are_grouped_under_country_headers_in_slug_order() {
        let tmp = TempDir::new().unwrap();
        let run = tmp.path();
        seed(&run.join("emails"), "fiji.txt", "Subject: A\n\nBody.\n").await;
        seed(
            &run.join("emails"),
            "bosnia-and-herzegovina.txt",
            "Subject: B\n\nBody.\n",
        )
        .await;

        rebuild(run).await.unwrap();
        let text = fs::read_to_string(run.join("all_emails")).await.unwrap();
        assert_eq!(
            text,
            "Bosnia And Herzegovina\nSubject: B\n\nBody.\n\nFiji\nSubject: A\n\nBody.\n\n"
        );
    }

    #[tokio::test]
    async fn info_concatenates_without_headers() {
        let tmp = TempDir::new().unwrap();
        let run = tmp.path();
        seed(&run.join("info"), "fiji.txt", "- bullet one\n").await;
        seed(&run.join("info"), "ghana.txt", "- bullet two\n").await;

        rebuild(run).await.unwrap();
        let text = fs::read_to_string(run.join("all_info")).await.unwrap();
        assert_eq!(text, "- bullet one\n\n- bullet two\n\n");
        assert!(!text.contains("Fiji"));
    }

    #[tokio::test]
    async fn missing_source_dir_removes_the_stale_aggregate() {
        let tmp = TempDir::new().unwrap();
        let run = tmp.path();
        seed(&run.join("info"), "fiji.txt", "- bullet\n").await;
        fs::write(run.join("all_emails"), "stale\n").await.unwrap();

        rebuild(run).await.unwrap();
        assert!(run.join("all_info").exists());
        assert!(!run.join("all_emails").exists());
    }
}
