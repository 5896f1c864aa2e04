//! Core data model for the collection and drafting pipeline.
//!
//! Items move through three representations as they travel the pipeline:
//!
//! - [`RawItem`]: what a collector scraped, publish date still optional
//! - [`ResolvedItem`]: the same item after date resolution; every instance
//!   carries a concrete publish date, so cutoff filtering never guesses
//! - [`FusedCorpus`]: the per-country merge of all resolved items, split
//!   into fixed sections and deduplicated by canonical URL
//!
//! The drafting side produces a [`Digest`] (informational bullets) and zero
//! or more [`Draft`]s (outreach emails) per country.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Identifies which collector produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTag {
    PressGuardian,
    PressAljazeera,
    UnPress,
}

impl SourceTag {
    pub const ALL: [SourceTag; 3] = [
        SourceTag::PressGuardian,
        SourceTag::PressAljazeera,
        SourceTag::UnPress,
    ];

    /// Human-readable label used in corpus files and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            SourceTag::PressGuardian => "The Guardian",
            SourceTag::PressAljazeera => "Al Jazeera",
            SourceTag::UnPress => "UN Press",
        }
    }

    /// Short machine key used in logs.
    pub fn key(&self) -> &'static str {
        match self {
            SourceTag::PressGuardian => "guardian",
            SourceTag::PressAljazeera => "aljazeera",
            SourceTag::UnPress => "un",
        }
    }

    /// Which corpus section this source's items land in.
    pub fn section(&self) -> Section {
        match self {
            SourceTag::PressGuardian | SourceTag::PressAljazeera => Section::Press,
            SourceTag::UnPress => Section::Un,
        }
    }

    /// Inverse of [`SourceTag::label`], used when parsing corpus files back.
    pub fn from_label(label: &str) -> Option<SourceTag> {
        match label.trim() {
            "The Guardian" => Some(SourceTag::PressGuardian),
            "Al Jazeera" => Some(SourceTag::PressAljazeera),
            "UN Press" => Some(SourceTag::UnPress),
            _ => None,
        }
    }
}

/// Corpus sections, in the fixed order they appear in every corpus file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Press,
    Un,
}

impl Section {
    pub const ORDER: [Section; 2] = [Section::Press, Section::Un];

    /// Heading line as written to corpus files, always at column zero.
    pub fn heading(&self) -> &'static str {
        match self {
            Section::Press => "[PRESS]",
            Section::Un => "[UN]",
        }
    }

    /// Label used in the `No <label> results found.` placeholder line.
    pub fn label(&self) -> &'static str {
        match self {
            Section::Press => "Press",
            Section::Un => "UN",
        }
    }

    /// Row name used in the `_index.csv` artifact.
    pub fn index_name(&self) -> &'static str {
        match self {
            Section::Press => "press",
            Section::Un => "un",
        }
    }

    /// Stand-in source for corpus lines whose label is no longer recognized.
    pub fn default_source(&self) -> SourceTag {
        match self {
            Section::Press => SourceTag::PressGuardian,
            Section::Un => SourceTag::UnPress,
        }
    }
}

/// An item as scraped from a listing or API, before date resolution.
///
/// Collectors build the whole item, including the optional full text, and
/// hand it off. Nothing downstream mutates it; promotion to a
/// [`ResolvedItem`] consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub source: SourceTag,
    pub title: String,
    pub url: String,
    pub published: Option<NaiveDate>,
    pub body: Option<String>,
}

impl RawItem {
    /// Promote to a [`ResolvedItem`] once a publish date is known.
    pub fn resolved(self, published: NaiveDate) -> ResolvedItem {
        ResolvedItem {
            source: self.source,
            title: self.title,
            url: self.url,
            published,
            body: self.body,
        }
    }
}

/// An item with a concrete publish date: the only representation the cutoff
/// filter, the fuser, and the artifact writers ever see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub source: SourceTag,
    pub title: String,
    pub url: String,
    pub published: NaiveDate,
    pub body: Option<String>,
}

/// One section of a fused corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSection {
    pub section: Section,
    pub items: Vec<ResolvedItem>,
}

/// Per-country merge of every source's filtered items.
///
/// Invariants: sections appear in [`Section::ORDER`], items within a section
/// are newest-first, and no two items anywhere in the corpus share a
/// canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusedCorpus {
    pub country: String,
    pub cutoff: NaiveDate,
    pub sections: Vec<CorpusSection>,
}

impl FusedCorpus {
    pub fn section(&self, section: Section) -> Option<&CorpusSection> {
        self.sections.iter().find(|s| s.section == section)
    }

    /// Items in one section; empty slice when the section is absent.
    pub fn section_items(&self, section: Section) -> &[ResolvedItem] {
        self.section(section)
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn item_count(&self, section: Section) -> usize {
        self.section_items(section).len()
    }

    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

/// Informational bullets distilled from one country's corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    pub bullets: Vec<String>,
}

/// A single outreach email draft that survived validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Short theme label, e.g. "financing/investment". Optional.
    pub genre: Option<String>,
    pub subject: String,
    pub body: String,
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

/// Find the first `YYYY-MM-DD` occurrence anywhere in `text` and parse it.
///
/// Handles bare dates, ISO timestamps (`2025-08-20T10:31:00Z`), and dates
/// embedded in longer attribute values. Returns `None` when the digits do
/// not form a real calendar date.
pub fn find_iso_date(text: &str) -> Option<NaiveDate> {
    let caps = ISO_DATE.captures(text)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
