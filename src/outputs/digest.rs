//! Per-country digest and draft artifacts.
//!
//! `info/<slug>.txt` always exists after a drafting pass: bullets as `- `
//! lines, or a single placeholder line when the collaborator found nothing
//! substantive. `emails/<slug>.txt` exists only when validated drafts were
//! produced; a skipped country removes any stale file from a previous run
//! so re-invocation converges on the current decision.

use crate::error::PipelineError;
use crate::models::{Digest, Draft};
use std::fmt::Write as _;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

const EMPTY_DIGEST: &str = "(No substantive updates identified.)";

pub async fn write_digest(path: &Path, digest: &Digest) -> Result<(), PipelineError> {
    let mut out = String::new();
    if digest.bullets.is_empty() {
        out.push_str(EMPTY_DIGEST);
        out.push('\n');
    } else {
        for bullet in &digest.bullets {
            writeln!(out, "- {bullet}").unwrap();
        }
    }
    fs::write(path, out)
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
    info!(path = %path.display(), bullets = digest.bullets.len(), "Digest written");
    Ok(())
}

/// Write the country's email drafts, or remove the file when there are
/// none to write.
pub async fn write_drafts(path: &Path, drafts: &[Draft]) -> Result<(), PipelineError> {
    if drafts.is_empty() {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "Removed stale drafts file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(PipelineError::io(format!("removing {}", path.display()), e)),
        }
        return Ok(());
    }

    let blocks: Vec<String> = drafts
        .iter()
        .map(|draft| {
            let mut block = String::new();
            if let Some(genre) = &draft.genre {
                writeln!(block, "Genre: {genre}").unwrap();
            }
            write!(block, "Subject: {}\n\n{}", draft.subject, draft.body).unwrap();
            block
        })
        .collect();
    let mut out = blocks.join("\n\n---\n\n");
    out.push('\n');

    fs::write(path, out)
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", path.display()), e))?;
    info!(path = %path.display(), drafts = drafts.len(), "Drafts written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn digest_bullets_become_dash_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fiji.txt");
        let digest = Digest {
            bullets: vec!["First [2025-08-26; UN Press]".into(), "Second [2025-08-27; The Guardian]".into()],
        };
        write_digest(&path, &digest).await.unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            text,
            "- First [2025-08-26; UN Press]\n- Second [2025-08-27; The Guardian]\n"
        );
    }

    #[tokio::test]
    async fn empty_digest_writes_the_placeholder() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fiji.txt");
        write_digest(&path, &Digest::default()).await.unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "(No substantive updates identified.)\n");
    }

    #[tokio::test]
    async fn drafts_are_separated_blocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fiji.txt");
        let drafts = vec![
            Draft {
                genre: Some("financing/investment".into()),
                subject: "Blended finance window".into(),
                body: "Body one.".into(),
            },
            Draft {
                genre: None,
                subject: "Partnership follow-up".into(),
                body: "Body two.".into(),
            },
        ];
        write_drafts(&path, &drafts).await.unwrap();
        let text = fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            text,
            "Genre: financing/investment\n\
             Subject: Blended finance window\n\
             \n\
             Body one.\n\
             \n\
             ---\n\
             \n\
             Subject: Partnership follow-up\n\
             \n\
             Body two.\n"
        );
    }

    #[tokio::test]
    async fn no_drafts_removes_a_stale_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fiji.txt");
        fs::write(&path, "Subject: old\n\nold body\n").await.unwrap();
        write_drafts(&path, &[]).await.unwrap();
        assert!(!path.exists());
        // Absent file is fine too.
        write_drafts(&path, &[]).await.unwrap();
    }
}
