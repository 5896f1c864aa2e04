//! Command-line interface definitions for the country digest pipeline.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Credentials can be provided via flags or environment variables;
//! everything else merges with the YAML params file in `config`.

use clap::{Parser, Subcommand};

/// Command-line arguments for the country digest pipeline.
///
/// Flags override the params file; the two credential flags also fall back
/// to environment variables.
///
/// # Examples
///
/// ```sh
/// # Collect press coverage for every configured country
/// country_digest --config params.yaml press
///
/// # Collect UN Press releases, overriding the cutoff
/// country_digest --cutoff 2025-08-25 un
///
/// # Full pipeline: collect, draft, aggregate
/// OPENAI_API_KEY=sk-... country_digest run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML params file
    #[arg(short, long, default_value = "params.yaml")]
    pub config: String,

    /// Countries file: one display name per line, '#' comments allowed
    #[arg(long)]
    pub countries: Option<String>,

    /// Cutoff date (YYYY-MM-DD); items published before it are dropped
    #[arg(long)]
    pub cutoff: Option<String>,

    /// Output root directory (run directory is <out>/<YYYYMMDD>/)
    #[arg(long)]
    pub out: Option<String>,

    /// Fetch full article bodies instead of listing metadata only
    #[arg(long)]
    pub fulltext: bool,

    /// Guardian content API key
    #[arg(long, env = "GUARDIAN_API_KEY")]
    pub guardian_api_key: Option<String>,

    /// API key for the OpenAI-compatible drafting endpoint
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline phases. Each is idempotent with respect to re-invocation for
/// the same cutoff date.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Collect Guardian and Al Jazeera coverage into [PRESS] sections
    Press,
    /// Collect UN Press releases into [UN] sections
    Un,
    /// Draft digests and outreach emails from collected corpora
    Draft,
    /// Run the configured collection phases, then draft and aggregate
    Run,
}

impl Command {
    /// Whether this phase talks to the drafting API (and therefore needs
    /// `OPENAI_API_KEY` at startup).
    pub fn needs_collaborator(&self) -> bool {
        matches!(self, Command::Draft | Command::Run)
    }
}
