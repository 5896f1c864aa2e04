//! # Country Digest
//!
//! A country-focused collection and drafting pipeline: it gathers recent
//! coverage of each configured country from The Guardian, Al Jazeera, and
//! UN Press, fuses it into a per-country text corpus, and drafts a
//! bulleted digest plus outreach emails through an OpenAI-compatible
//! completions API.
//!
//! ## Features
//!
//! - Collects country coverage from press sources (The Guardian Content
//!   API, Al Jazeera tag pages) and UN Press site search
//! - Resolves missing publish dates from article pages under a bounded
//!   fetch budget, then trims everything before the cutoff date
//! - Writes one sectioned text artifact per country, re-runnable per
//!   phase without disturbing the other section
//! - Drafts digests and genre-tagged outreach emails through an
//!   OpenAI-compatible completions API
//! - Maintains a run index CSV, cross-country aggregates, and a partial
//!   marker when a deadline cuts a run short
//!
//! ## Usage
//!
//! ```sh
//! country_digest --config params.yaml press
//! country_digest --config params.yaml un
//! OPENAI_API_KEY=sk-... country_digest --config params.yaml run
//! ```
//!
//! ## Architecture
//!
//! Each invocation works inside a dated run directory, `<out>/<YYYYMMDD>/`:
//! 1. **Collect**: per-country, per-source fetches (rate-gated, retried)
//!    into the `[PRESS]` and `[UN]` sections of `text/<slug>.txt`
//! 2. **Draft**: per-country completion calls producing `info/<slug>.txt`
//!    digests and `emails/<slug>.txt` outreach drafts
//! 3. **Aggregate**: `all_info` / `all_emails` concatenations, plus the
//!    `_index.csv` outcome row per (country, section)

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod config;
mod drafting;
mod error;
mod fetch;
mod fuse;
mod models;
mod outputs;
mod pipeline;
mod resolve;
mod scrapers;
mod utils;

use cli::{Cli, Command};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("country_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.config, ?args.command, "Parsed CLI arguments");

    let ctx = match config::load(&args).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "Configuration rejected");
            return Err(e.into());
        }
    };
    info!(
        countries = ctx.countries.len(),
        cutoff = %ctx.cutoff,
        run_dir = %ctx.run_dir().display(),
        "Configuration loaded"
    );

    // Early check: ensure the run directory is writable
    let run_dir = ctx.run_dir();
    if let Err(e) = ensure_writable_dir(&run_dir).await {
        error!(
            path = %run_dir.display(),
            error = %e,
            "Run directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    match args.command {
        Command::Press => pipeline::run_press(&ctx).await?,
        Command::Un => pipeline::run_un(&ctx).await?,
        Command::Draft => pipeline::run_draft(&ctx).await?,
        Command::Run => pipeline::run_all(&ctx).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
