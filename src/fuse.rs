//! Fusion of per-source item lists into one per-country corpus.
//!
//! Fusion is deterministic: the same inputs in the same order always
//! produce the same corpus. Within a section items are sorted newest-first
//! with a stable sort, so two items sharing a publish date keep the order
//! of the source lists as passed in. Duplicate canonical URLs keep their
//! first occurrence, which also means the press section wins when the same
//! story shows up in both sections.

use crate::models::{CorpusSection, FusedCorpus, ResolvedItem, Section};
use crate::utils::canonical_url;
use chrono::NaiveDate;
use itertools::Itertools;
use std::collections::HashSet;

/// Flatten `lists` and sort newest-first, preserving input order between
/// items that share a publish date.
fn merge_newest_first(lists: Vec<Vec<ResolvedItem>>) -> Vec<ResolvedItem> {
    let mut merged: Vec<ResolvedItem> = lists.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.published.cmp(&a.published));
    merged
}

/// Merge and dedupe one section's source lists.
fn fuse_section(section: Section, lists: Vec<Vec<ResolvedItem>>) -> CorpusSection {
    let items = merge_newest_first(lists)
        .into_iter()
        .unique_by(|item| canonical_url(&item.url))
        .collect();
    CorpusSection { section, items }
}

/// Build the fused corpus for one country.
///
/// Press lists fuse into the `[PRESS]` section; the UN list fuses into
/// `[UN]` after dropping anything whose canonical URL already appears in
/// press. Sections are always present, even when empty, in their fixed
/// order.
pub fn fuse(
    country: &str,
    cutoff: NaiveDate,
    press_lists: Vec<Vec<ResolvedItem>>,
    un_list: Vec<ResolvedItem>,
) -> FusedCorpus {
    let press = fuse_section(Section::Press, press_lists);
    let press_urls: HashSet<String> = press
        .items
        .iter()
        .map(|item| canonical_url(&item.url))
        .collect();

    let mut un = fuse_section(Section::Un, vec![un_list]);
    un.items
        .retain(|item| !press_urls.contains(&canonical_url(&item.url)));

    FusedCorpus {
        country: country.to_string(),
        cutoff,
        sections: vec![press, un],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceTag;

    fn item(source: SourceTag, title: &str, url: &str, ymd: (i32, u32, u32)) -> ResolvedItem {
        ResolvedItem {
            source,
            title: title.into(),
            url: url.into(),
            published: NaiveDate::from_ymd_opt(ymd.0, ymd.1, ymd.2).unwrap(),
            body: None,
        }
    }

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 25).unwrap()
    }

    #[test]
    fn press_section_is_newest_first() {
        let guardian = vec![
            item(SourceTag::PressGuardian, "old", "https://g/old", (2025, 8, 25)),
            item(SourceTag::PressGuardian, "new", "https://g/new", (2025, 8, 28)),
        ];
        let aljazeera = vec![item(
            SourceTag::PressAljazeera,
            "mid",
            "https://aj/mid",
            (2025, 8, 26),
        )];
        let corpus = fuse("Fiji", cutoff(), vec![guardian, aljazeera], vec![]);
        let titles: Vec<_> = corpus
            .section_items(Section::Press)
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
    }

    #[test]
    fn same_day_items_keep_source_list_order() {
        let guardian = vec![item(
            SourceTag::PressGuardian,
            "guardian take",
            "https://g/a",
            (2025, 8, 26),
        )];
        let aljazeera = vec![item(
            SourceTag::PressAljazeera,
            "aljazeera take",
            "https://aj/a",
            (2025, 8, 26),
        )];
        let corpus = fuse("Fiji", cutoff(), vec![guardian, aljazeera], vec![]);
        let titles: Vec<_> = corpus
            .section_items(Section::Press)
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["guardian take", "aljazeera take"]);
    }

    #[test]
    fn duplicate_urls_keep_first_occurrence() {
        // Same story syndicated with a tracking query; canonical form matches.
        let guardian = vec![item(
            SourceTag::PressGuardian,
            "original headline",
            "https://news.example/story?utm=x",
            (2025, 8, 26),
        )];
        let aljazeera = vec![item(
            SourceTag::PressAljazeera,
            "rewritten headline",
            "https://news.example/story",
            (2025, 8, 26),
        )];
        let corpus = fuse("Fiji", cutoff(), vec![guardian, aljazeera], vec![]);
        let press = corpus.section_items(Section::Press);
        assert_eq!(press.len(), 1);
        assert_eq!(press[0].title, "original headline");
    }

    #[test]
    fn un_items_already_in_press_are_dropped() {
        let press = vec![item(
            SourceTag::PressGuardian,
            "council extends mandate",
            "https://press.un.org/en/2025/sc123.doc.htm",
            (2025, 8, 26),
        )];
        let un = vec![
            item(
                SourceTag::UnPress,
                "SC/123 mandate extension",
                "https://press.un.org/en/2025/sc123.doc.htm",
                (2025, 8, 26),
            ),
            item(
                SourceTag::UnPress,
                "unique release",
                "https://press.un.org/en/2025/sg100.doc.htm",
                (2025, 8, 27),
            ),
        ];
        let corpus = fuse("Fiji", cutoff(), vec![press], un);
        assert_eq!(corpus.item_count(Section::Press), 1);
        let un_titles: Vec<_> = corpus
            .section_items(Section::Un)
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(un_titles, vec!["unique release"]);
    }

    #[test]
    fn fusion_is_deterministic() {
        let make = || {
            fuse(
                "Fiji",
                cutoff(),
                vec![
                    vec![
                        item(SourceTag::PressGuardian, "a", "https://g/a", (2025, 8, 26)),
                        item(SourceTag::PressGuardian, "b", "https://g/b", (2025, 8, 27)),
                    ],
                    vec![item(SourceTag::PressAljazeera, "c", "https://aj/c", (2025, 8, 26))],
                ],
                vec![item(SourceTag::UnPress, "d", "https://un/d", (2025, 8, 25))],
            )
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn empty_inputs_give_empty_sections_in_order() {
        let corpus = fuse("Fiji", cutoff(), vec![vec![], vec![]], vec![]);
        assert!(corpus.is_empty());
        let order: Vec<_> = corpus.sections.iter().map(|s| s.section).collect();
        assert_eq!(order, vec![Section::Press, Section::Un]);
    }
}
