//! Artifact writers for the run directory.
//!
//! This module contains submodules responsible for every file the pipeline
//! persists:
//!
//! # Submodules
//!
//! - [`corpus`]: renders, upserts, and parses the per-country text artifact
//! - [`index`]: merge-rewrites the run-level `_index.csv`
//! - [`digest`]: writes digest bullets and email drafts per country
//! - [`aggregate`]: rebuilds the cross-country `all_info` / `all_emails`
//!
//! # Output Structure
//!
//! ```text
//! outputs/<CUTOFF_YYYYMMDD>/
//! ├── _index.csv          # country,section,item_count,status
//! ├── _partial            # present only when the run hit its deadline
//! ├── text/<slug>.txt     # fused corpus, [PRESS] / [UN] sections
//! ├── info/<slug>.txt     # digest bullets
//! ├── emails/<slug>.txt   # drafts, Genre/Subject/body blocks
//! ├── all_info            # every info file, concatenated
//! └── all_emails          # every email file, under a country header
//! ```
//!
//! The text artifact is the durable handoff between collection and
//! drafting: the drafting phase reads it back rather than holding the
//! corpus in memory, so the phases can run as separate invocations.

pub mod aggregate;
pub mod corpus;
pub mod digest;
pub mod index;
