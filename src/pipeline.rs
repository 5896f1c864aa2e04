//! Phase drivers that tie collectors, fusion, drafting, and outputs into
//! whole runs.
//!
//! | Phase | Entry | Work |
//! |-------|-------|------|
//! | Collect | [`run_press`], [`run_un`] | Fan out over countries, write text artifacts |
//! | Draft | [`run_draft`] | Parse each artifact, call the model, write digest and emails |
//! | Full | [`run_all`] | Collect per configured sources, then draft, then aggregate |
//!
//! Collection processes countries with bounded concurrency; drafting walks
//! them sequentially, one completion call at a time. Failures degrade: a
//! source error empties its section, a failed draft call leaves existing
//! artifacts in place, and every outcome lands in the run index. Only
//! configuration, client setup, and artifact I/O errors surface here.

use crate::api::{Collaborator, DraftRequest, OpenAiCollaborator, RetryCollaborator};
use crate::config::{RunContext, SourceMode};
use crate::drafting;
use crate::error::{ConfigError, FetchError, PipelineError};
use crate::fetch::{Fetch, GatedFetch, HttpFetcher, RetryFetch, SourceGates};
use crate::fuse;
use crate::models::{Digest, ResolvedItem, Section};
use crate::outputs::index::IndexRow;
use crate::outputs::{aggregate, corpus, digest, index};
use crate::resolve;
use crate::scrapers::SourceCollector;
use crate::utils::slugify;
use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Index section names for the drafting phase. Collection rows use
/// [`Section::index_name`] instead.
const INFO_SECTION: &str = "info";
const EMAILS_SECTION: &str = "emails";

/// Collect press sections for every configured country.
pub async fn run_press(ctx: &RunContext) -> Result<(), PipelineError> {
    let fetch = HttpFetcher::new()?;
    collect_with(&fetch, ctx, SourceMode::Press).await
}

/// Collect UN sections for every configured country.
pub async fn run_un(ctx: &RunContext) -> Result<(), PipelineError> {
    let fetch = HttpFetcher::new()?;
    collect_with(&fetch, ctx, SourceMode::Un).await
}

/// Draft digests and emails from the text artifacts already on disk.
pub async fn run_draft(ctx: &RunContext) -> Result<(), PipelineError> {
    let key = ctx
        .openai_api_key
        .as_deref()
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let collaborator = RetryCollaborator::new(
        OpenAiCollaborator::new(key, &ctx.model)?.with_base_url(&ctx.openai_base_url),
    );
    draft_with(&collaborator, ctx).await
}

/// The whole pipeline: collect the configured sources, then draft.
pub async fn run_all(ctx: &RunContext) -> Result<(), PipelineError> {
    let fetch = HttpFetcher::new()?;
    collect_with(&fetch, ctx, ctx.sources).await?;
    run_draft(ctx).await
}

/// What the index should say about one section of one country.
///
/// Cancellation wins over failure, and a section can carry items yet still
/// read `fetch_failed` when a sibling source of the same section failed.
#[derive(Debug, Clone, Copy, Default)]
struct SectionHealth {
    failed: bool,
    cancelled: bool,
}

impl SectionHealth {
    fn note(&mut self, error: &FetchError) {
        match error {
            FetchError::Cancelled => self.cancelled = true,
            _ => self.failed = true,
        }
    }

    fn absorb(&mut self, other: SectionHealth) {
        self.failed |= other.failed;
        self.cancelled |= other.cancelled;
    }

    fn status(&self, count: usize) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.failed {
            "fetch_failed"
        } else if count == 0 {
            "empty"
        } else {
            "ok"
        }
    }
}

/// Index rows produced for one country, plus whether the deadline cut it
/// short.
struct CountryOutcome {
    rows: Vec<IndexRow>,
    cancelled: bool,
}

/// Run one collector for one country behind its gate and retry policy,
/// then resolve dates and trim to the cutoff.
async fn collect_source<F: Fetch + Clone>(
    fetch: &F,
    gates: &SourceGates,
    collector: SourceCollector,
    country: &str,
    ctx: &RunContext,
) -> (Vec<ResolvedItem>, SectionHealth) {
    let tag = collector.tag();
    let fetch = RetryFetch::new(GatedFetch::new(fetch.clone(), gates.gate(tag), ctx.deadline));
    let mut health = SectionHealth::default();
    let raw = match collector.collect(&fetch, country, ctx).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                country = %country,
                source = tag.key(),
                error = %e,
                "Source collection failed; section degrades to empty"
            );
            health.note(&e);
            return (Vec::new(), health);
        }
    };
    let items = resolve::resolve_and_trim(&fetch, raw, collector.cap(ctx), ctx.cutoff).await;
    (items, health)
}

async fn maybe_collect<F: Fetch + Clone>(
    enabled: bool,
    fetch: &F,
    gates: &SourceGates,
    collector: SourceCollector,
    country: &str,
    ctx: &RunContext,
) -> Option<(Vec<ResolvedItem>, SectionHealth)> {
    if !enabled {
        return None;
    }
    Some(collect_source(fetch, gates, collector, country, ctx).await)
}

/// Collect every enabled source for one country, fuse, and upsert the
/// enabled sections of its text artifact. Sections the mode leaves out are
/// not touched, so a press run preserves an earlier UN section byte for
/// byte.
#[instrument(level = "info", skip_all, fields(country = %country))]
async fn collect_country<F: Fetch + Clone>(
    fetch: &F,
    gates: &SourceGates,
    country: &str,
    ctx: &RunContext,
    mode: SourceMode,
) -> Result<CountryOutcome, PipelineError> {
    let slug = slugify(country);
    let press_enabled = mode.includes_press();
    let un_enabled = mode.includes_un();

    let (guardian, aljazeera, un) = tokio::join!(
        maybe_collect(press_enabled, fetch, gates, SourceCollector::Guardian, country, ctx),
        maybe_collect(press_enabled, fetch, gates, SourceCollector::AlJazeera, country, ctx),
        maybe_collect(un_enabled, fetch, gates, SourceCollector::UnPress, country, ctx),
    );

    let mut press_health = SectionHealth::default();
    let mut press_lists = Vec::new();
    for collected in [guardian, aljazeera].into_iter().flatten() {
        press_lists.push(collected.0);
        press_health.absorb(collected.1);
    }
    let (un_list, un_health) = un.unwrap_or_default();

    let fused = fuse::fuse(country, ctx.cutoff, press_lists, un_list);
    let path = ctx.text_dir().join(format!("{slug}.txt"));

    let mut rows = Vec::new();
    if press_enabled {
        let items = fused.section_items(Section::Press);
        corpus::upsert_section(&path, country, ctx.cutoff, Section::Press, items).await?;
        rows.push(IndexRow::new(
            &slug,
            Section::Press.index_name(),
            items.len(),
            press_health.status(items.len()),
        ));
    }
    if un_enabled {
        let items = fused.section_items(Section::Un);
        corpus::upsert_section(&path, country, ctx.cutoff, Section::Un, items).await?;
        rows.push(IndexRow::new(
            &slug,
            Section::Un.index_name(),
            items.len(),
            un_health.status(items.len()),
        ));
    }

    Ok(CountryOutcome {
        rows,
        cancelled: press_health.cancelled || un_health.cancelled,
    })
}

/// Drive a collection phase over all countries with bounded concurrency.
///
/// Per-country artifact I/O errors degrade to `io_failed` rows; only dir
/// setup and index writes abort the phase.
#[instrument(level = "info", skip_all, fields(mode = ?mode))]
async fn collect_with<F: Fetch + Clone>(
    fetch: &F,
    ctx: &RunContext,
    mode: SourceMode,
) -> Result<(), PipelineError> {
    let text_dir = ctx.text_dir();
    fs::create_dir_all(&text_dir)
        .await
        .map_err(|e| PipelineError::io(format!("creating {}", text_dir.display()), e))?;

    let gates = SourceGates::new(ctx.rate_limit);
    let outcomes: Vec<(&str, Result<CountryOutcome, PipelineError>)> =
        stream::iter(ctx.countries.iter())
            .map(|country| {
                let gates = &gates;
                async move {
                    let outcome = collect_country(fetch, gates, country, ctx, mode).await;
                    (country.as_str(), outcome)
                }
            })
            .buffer_unordered(ctx.concurrency)
            .collect()
            .await;

    let mut rows = Vec::new();
    let mut any_cancelled = false;
    for (country, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                any_cancelled |= outcome.cancelled;
                rows.extend(outcome.rows);
            }
            Err(e) => {
                error!(country = %country, error = %e, "Artifact write failed");
                let slug = slugify(country);
                if mode.includes_press() {
                    rows.push(IndexRow::new(&slug, Section::Press.index_name(), 0, "io_failed"));
                }
                if mode.includes_un() {
                    rows.push(IndexRow::new(&slug, Section::Un.index_name(), 0, "io_failed"));
                }
            }
        }
    }
    index::merge_rows(&ctx.index_path(), rows).await?;
    if any_cancelled {
        mark_partial(ctx).await?;
    }
    info!(countries = ctx.countries.len(), "Collection phase complete");
    Ok(())
}

/// Draft one country from its text artifact.
///
/// Absent artifact: `skipped` rows, nothing written. Empty corpus: the
/// placeholder digest is written and no completion call is made. A failed
/// call leaves whatever artifacts a previous run produced.
#[instrument(level = "info", skip_all, fields(country = %country))]
async fn draft_country<C: Collaborator>(
    collaborator: &C,
    country: &str,
    slug: &str,
    ctx: &RunContext,
) -> Result<Vec<IndexRow>, PipelineError> {
    let text_path = ctx.text_dir().join(format!("{slug}.txt"));
    let text = match fs::read_to_string(&text_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(country = %country, "No text artifact; nothing to draft");
            return Ok(vec![
                IndexRow::new(slug, INFO_SECTION, 0, "skipped"),
                IndexRow::new(slug, EMAILS_SECTION, 0, "skipped"),
            ]);
        }
        Err(e) => {
            return Err(PipelineError::io(
                format!("reading {}", text_path.display()),
                e,
            ));
        }
    };

    let info_path = ctx.info_dir().join(format!("{slug}.txt"));
    let emails_path = ctx.emails_dir().join(format!("{slug}.txt"));

    let parsed = corpus::parse(&text, country, ctx.cutoff);
    if parsed.is_empty() {
        digest::write_digest(&info_path, &Digest::default()).await?;
        digest::write_drafts(&emails_path, &[]).await?;
        info!(country = %country, "Corpus empty; placeholder digest written without a model call");
        return Ok(vec![
            IndexRow::new(slug, INFO_SECTION, 0, "empty"),
            IndexRow::new(slug, EMAILS_SECTION, 0, "empty"),
        ]);
    }

    let request = DraftRequest::from_corpus(
        &parsed,
        text,
        ctx.info_limit,
        ctx.email_min_items,
        ctx.email_words_min,
        ctx.email_words_max,
        ctx.temperature,
    );
    match drafting::derive(collaborator, &request).await {
        Ok((summary, drafts)) => {
            digest::write_digest(&info_path, &summary).await?;
            digest::write_drafts(&emails_path, &drafts).await?;
            let info_status = if summary.bullets.is_empty() { "empty" } else { "ok" };
            let emails_status = if drafts.is_empty() { "empty" } else { "ok" };
            info!(
                country = %country,
                bullets = summary.bullets.len(),
                drafts = drafts.len(),
                "Drafting complete"
            );
            Ok(vec![
                IndexRow::new(slug, INFO_SECTION, summary.bullets.len(), info_status),
                IndexRow::new(slug, EMAILS_SECTION, drafts.len(), emails_status),
            ])
        }
        Err(e) => {
            warn!(
                country = %country,
                error = %e,
                "Draft call failed; existing artifacts left in place"
            );
            Ok(vec![
                IndexRow::new(slug, INFO_SECTION, 0, "draft_failed"),
                IndexRow::new(slug, EMAILS_SECTION, 0, "draft_failed"),
            ])
        }
    }
}

/// Drive the drafting phase over all countries, then rebuild aggregates.
#[instrument(level = "info", skip_all)]
async fn draft_with<C: Collaborator>(
    collaborator: &C,
    ctx: &RunContext,
) -> Result<(), PipelineError> {
    for dir in [ctx.info_dir(), ctx.emails_dir()] {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::io(format!("creating {}", dir.display()), e))?;
    }

    let mut rows = Vec::new();
    let mut any_cancelled = false;
    for country in &ctx.countries {
        let slug = slugify(country);
        if ctx.past_deadline() {
            warn!(country = %country, "Run deadline passed; draft cancelled");
            rows.push(IndexRow::new(&slug, INFO_SECTION, 0, "cancelled"));
            rows.push(IndexRow::new(&slug, EMAILS_SECTION, 0, "cancelled"));
            any_cancelled = true;
            continue;
        }
        match draft_country(collaborator, country, &slug, ctx).await {
            Ok(country_rows) => rows.extend(country_rows),
            Err(e) => {
                error!(country = %country, error = %e, "Artifact write failed");
                rows.push(IndexRow::new(&slug, INFO_SECTION, 0, "io_failed"));
                rows.push(IndexRow::new(&slug, EMAILS_SECTION, 0, "io_failed"));
            }
        }
    }
    index::merge_rows(&ctx.index_path(), rows).await?;
    if any_cancelled {
        mark_partial(ctx).await?;
    }
    aggregate::rebuild(&ctx.run_dir()).await?;
    info!(countries = ctx.countries.len(), "Drafting phase complete");
    Ok(())
}

/// Drop the partial marker into the run directory. The marker stays until
/// the directory is rebuilt, so a later clean phase does not hide an
/// earlier cancellation.
async fn mark_partial(ctx: &RunContext) -> Result<(), PipelineError> {
    let marker = ctx.partial_marker();
    warn!(marker = %marker.display(), "Deadline passed during the run; marking it partial");
    fs::write(&marker, "deadline exceeded\n")
        .await
        .map_err(|e| PipelineError::io(format!("writing {}", marker.display()), e))
}
