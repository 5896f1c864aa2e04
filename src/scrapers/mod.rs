//! Per-source collectors for country-tagged coverage.
//!
//! This module contains one submodule per upstream source. Each collector
//! follows the same contract: given a fetch handle, a country display name,
//! and the run settings, return up to the source's configured cap of
//! [`RawItem`](crate::models::RawItem)s, newest first as listed upstream.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | The Guardian | [`guardian`] | Content API | JSON search endpoint, keyed |
//! | Al Jazeera | [`aljazeera`] | HTML scraping | `/where/<country>/` tag page |
//! | UN Press | [`unpress`] | HTML scraping | Paginated site search walk |
//!
//! # Common Patterns
//!
//! Collectors own every network read for their source, including optional
//! full-text page fetches, and never filter by date beyond early-stop
//! heuristics: date resolution and cutoff filtering happen downstream so
//! the rules live in one place. A collector error fails only that
//! (country, source) pair; the caller degrades it to an empty list.

pub mod aljazeera;
pub mod guardian;
pub mod unpress;

use crate::config::RunContext;
use crate::error::FetchError;
use crate::fetch::Fetch;
use crate::models::{RawItem, SourceTag};

/// Closed set of collectors, dispatched by match so adding a source is a
/// compile-time checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCollector {
    Guardian,
    AlJazeera,
    UnPress,
}

impl SourceCollector {
    pub fn tag(&self) -> SourceTag {
        match self {
            SourceCollector::Guardian => SourceTag::PressGuardian,
            SourceCollector::AlJazeera => SourceTag::PressAljazeera,
            SourceCollector::UnPress => SourceTag::UnPress,
        }
    }

    /// Per-source item cap from the run settings.
    pub fn cap(&self, ctx: &RunContext) -> usize {
        match self {
            SourceCollector::Guardian => ctx.limit_guardian,
            SourceCollector::AlJazeera => ctx.limit_aljazeera,
            SourceCollector::UnPress => ctx.limit_un,
        }
    }

    /// Run this collector for one country.
    pub async fn collect<F: Fetch>(
        &self,
        fetch: &F,
        country: &str,
        ctx: &RunContext,
    ) -> Result<Vec<RawItem>, FetchError> {
        match self {
            SourceCollector::Guardian => guardian::recent(fetch, country, ctx).await,
            SourceCollector::AlJazeera => aljazeera::where_recent(fetch, country, ctx).await,
            SourceCollector::UnPress => unpress::search(fetch, country, ctx).await,
        }
    }
}
