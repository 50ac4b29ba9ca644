//! Text locator
//!
//! Finds the paragraph holding a target string using a fixed cascade of
//! matching strategies. Strategy precedence comes first, paragraph order
//! second: every paragraph is tried with an exact match before any
//! paragraph is tried with a looser one.
//!
//! Matching only looks at plain runs. Text already inside a tracked change
//! is never matched again, which makes re-applying an edit a miss rather
//! than a duplicate.

use std::ops::Range;

use regex_lite::Regex;
use serde::Serialize;

use super::variants;
use crate::core::document::{Document, Paragraph};

/// Matching strategies, in cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Plain substring
    Exact,
    /// Whitespace runs collapsed on both sides
    WhitespaceNormalized,
    /// Alternate spellings of numbers, "year(s)", and field labels
    Variant,
    /// Case-insensitive substring
    CaseInsensitive,
}

impl MatchStrategy {
    /// The cascade, highest precedence first
    pub const CASCADE: [MatchStrategy; 4] = [
        MatchStrategy::Exact,
        MatchStrategy::WhitespaceNormalized,
        MatchStrategy::Variant,
        MatchStrategy::CaseInsensitive,
    ];

    fn find(self, target: &PreparedTarget, text: &str) -> Option<Range<usize>> {
        match self {
            MatchStrategy::Exact => find_exact(text, &target.text),
            MatchStrategy::WhitespaceNormalized => {
                let tolerant = target.tolerant.as_ref()?;
                if !normalize_whitespace(text).contains(&target.normalized) {
                    return None;
                }
                // Recover the real text, tabs and all
                tolerant.find(text).map(|m| m.range())
            }
            MatchStrategy::Variant => target
                .variants
                .iter()
                .find_map(|variant| find_exact(text, variant)),
            MatchStrategy::CaseInsensitive => find_case_insensitive(text, &target.text),
        }
    }
}

/// Where a target was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    /// Document-order paragraph index
    pub paragraph_index: usize,
    pub strategy_used: MatchStrategy,
    /// The text as it actually appears in the paragraph
    pub located_text: String,
    /// Index of the run window inside the paragraph
    pub window: usize,
    /// Byte range of `located_text` inside the window text
    pub range: Range<usize>,
}

/// A target with everything the strategies need precomputed
#[derive(Debug)]
struct PreparedTarget {
    text: String,
    normalized: String,
    tolerant: Option<Regex>,
    variants: Vec<String>,
}

impl PreparedTarget {
    fn new(target: &str) -> Self {
        let normalized = normalize_whitespace(target);
        let tokens: Vec<&str> = normalized.split(' ').collect();
        let tolerant = if tokens.len() > 1 {
            let pattern = tokens
                .iter()
                .map(|token| regex_lite::escape(token))
                .collect::<Vec<_>>()
                .join(r"[\s\x{A0}]+");
            Regex::new(&pattern).ok()
        } else {
            None
        };

        Self {
            text: target.to_string(),
            normalized,
            tolerant,
            variants: variants::variants(target),
        }
    }
}

/// Whitespace recognised by the normalized strategy
fn is_blank(c: char) -> bool {
    c.is_ascii_whitespace() || c == '\u{a0}'
}

/// Collapse whitespace runs to one space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split(is_blank)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_exact(haystack: &str, needle: &str) -> Option<Range<usize>> {
    if needle.is_empty() {
        return None;
    }
    haystack.find(needle).map(|start| start..start + needle.len())
}

/// Case-insensitive search that reports byte offsets in the original haystack
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<Range<usize>> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        let mut pos = 0;
        for (offset, c) in haystack[start..].char_indices() {
            let mut matched = true;
            for lower in c.to_lowercase() {
                if pos < needle.len() && needle[pos] == lower {
                    pos += 1;
                } else {
                    matched = false;
                    break;
                }
            }
            if !matched {
                break;
            }
            if pos == needle.len() {
                return Some(start..start + offset + c.len_utf8());
            }
        }
    }

    None
}

/// Check whether any strategy finds `target` on one line of `text`.
/// Lines stand in for paragraphs, as in `Document::plain_text`.
pub fn text_contains(text: &str, target: &str) -> bool {
    if target.trim().is_empty() {
        return false;
    }
    let prepared = PreparedTarget::new(target);
    MatchStrategy::CASCADE
        .iter()
        .any(|strategy| text.lines().any(|line| strategy.find(&prepared, line).is_some()))
}

/// Locate `target` anywhere in the document
pub fn locate(document: &Document, target: &str) -> Option<MatchResult> {
    locate_chunked(document, target, usize::MAX)
}

/// Locate `target`, scanning paragraphs in batches of `chunk_size`.
///
/// Paragraphs are walked lazily, one batch at a time. The batch size never
/// changes the result: for each strategy every batch is scanned in order
/// before the next strategy starts.
pub fn locate_chunked(document: &Document, target: &str, chunk_size: usize) -> Option<MatchResult> {
    if target.trim().is_empty() {
        return None;
    }

    let prepared = PreparedTarget::new(target);
    let chunk_size = chunk_size.max(1);

    for strategy in MatchStrategy::CASCADE {
        let mut paragraphs = document.iter_paragraphs().enumerate();
        let mut start = 0;
        loop {
            let mut end = start;
            for (index, paragraph) in paragraphs.by_ref().take(chunk_size) {
                if let Some(result) = match_paragraph(paragraph, index, strategy, &prepared) {
                    tracing::debug!(
                        "Located '{}' in paragraph {} via {:?}",
                        target,
                        result.paragraph_index,
                        strategy
                    );
                    return Some(result);
                }
                end = index + 1;
            }
            if end == start {
                break;
            }
            if chunk_size < usize::MAX {
                tracing::trace!("{:?}: scanned paragraphs {}..{}", strategy, start, end);
            }
            start = end;
        }
    }

    tracing::debug!("Target not found: '{}'", target);
    None
}

fn match_paragraph(
    paragraph: &Paragraph,
    paragraph_index: usize,
    strategy: MatchStrategy,
    target: &PreparedTarget,
) -> Option<MatchResult> {
    paragraph
        .run_windows()
        .into_iter()
        .enumerate()
        .find_map(|(window, run_window)| {
            strategy.find(target, &run_window.text).map(|range| MatchResult {
                paragraph_index,
                strategy_used: strategy,
                located_text: run_window.text[range.clone()].to_string(),
                window,
                range,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{Run, Segment};

    fn doc(paragraphs: &[&str]) -> Document {
        Document::from_paragraphs(paragraphs.iter().map(|t| Paragraph::from_text(*t)).collect())
    }

    #[test]
    fn test_exact_match() {
        let d = doc(&["Intro", "Confidentiality survives for three years."]);
        let m = locate(&d, "three years").unwrap();
        assert_eq!(m.paragraph_index, 1);
        assert_eq!(m.strategy_used, MatchStrategy::Exact);
        assert_eq!(m.located_text, "three years");
    }

    #[test]
    fn test_whitespace_normalized_recovers_tab() {
        let d = doc(&["Agreement", "For:\tCompany"]);
        let m = locate(&d, "For: Company").unwrap();
        assert_eq!(m.paragraph_index, 1);
        assert_eq!(m.strategy_used, MatchStrategy::WhitespaceNormalized);
        assert_eq!(m.located_text, "For:\tCompany");
    }

    #[test]
    fn test_variant_match() {
        let d = doc(&["The term is five (5) years from signing."]);
        let m = locate(&d, "5 years").unwrap();
        assert_eq!(m.strategy_used, MatchStrategy::Variant);
        assert_eq!(m.located_text, "five (5) years");
    }

    #[test]
    fn test_case_insensitive_last_resort() {
        let d = doc(&["GOVERNED BY THE LAWS OF DELAWARE"]);
        let m = locate(&d, "laws of Delaware").unwrap();
        assert_eq!(m.strategy_used, MatchStrategy::CaseInsensitive);
        assert_eq!(m.located_text, "LAWS OF DELAWARE");
    }

    #[test]
    fn test_strategy_precedence_beats_paragraph_order() {
        // Paragraph 0 only matches case-insensitively, paragraph 1 exactly
        let d = doc(&["THREE YEARS", "three years"]);
        let m = locate(&d, "three years").unwrap();
        assert_eq!(m.paragraph_index, 1);
        assert_eq!(m.strategy_used, MatchStrategy::Exact);
    }

    #[test]
    fn test_match_across_runs() {
        let d = Document::from_paragraphs(vec![Paragraph::from_runs(vec![
            Run::new("survives for th"),
            Run::new("ree years."),
        ])]);
        let m = locate(&d, "three years").unwrap();
        assert_eq!(m.range, 13..24);
    }

    #[test]
    fn test_match_across_bookmark() {
        let d = Document::from_paragraphs(vec![Paragraph {
            properties: None,
            segments: vec![
                Segment::Run(Run::new("Confidentiality survives for three ")),
                Segment::Raw {
                    xml: "<w:bookmarkStart w:id=\"0\" w:name=\"term\"/>".into(),
                },
                Segment::Run(Run::new("years.")),
            ],
        }]);
        let m = locate(&d, "three years").unwrap();
        assert_eq!(m.strategy_used, MatchStrategy::Exact);
        assert_eq!(m.located_text, "three years");
        assert_eq!(m.range, 29..40);
    }

    #[test]
    fn test_text_contains_uses_cascade() {
        let text = "Survives for Three Years.\nReturned within two (2) years.";
        assert!(text_contains(text, "three years"));
        assert!(text_contains(text, "Returned  within"));
        assert!(!text_contains(text, "years. Returned"));
        assert!(!text_contains(text, "five years"));
    }

    #[test]
    fn test_not_found() {
        let d = doc(&["Nothing relevant"]);
        assert!(locate(&d, "three years").is_none());
        assert!(locate(&d, "").is_none());
    }

    #[test]
    fn test_chunked_matches_unchunked() {
        let mut texts: Vec<String> = (0..50).map(|i| format!("Clause {}", i)).collect();
        texts[7] = "THE PARTIES AGREE".to_string();
        texts[42] = "the parties agree".to_string();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let d = doc(&refs);

        let full = locate(&d, "the parties agree");
        for size in [1, 3, 10, 49, 50, 100] {
            assert_eq!(locate_chunked(&d, "the parties agree", size), full);
        }
        assert_eq!(full.unwrap().paragraph_index, 42);
    }

    #[test]
    fn test_chunked_walks_into_tables() {
        use crate::core::document::{Block, Table, TableCell, TableRow};

        let row = |text: &str| TableRow {
            properties: None,
            cells: vec![TableCell {
                properties: None,
                blocks: vec![Block::Paragraph(Paragraph::from_text(text))],
            }],
        };
        let mut blocks: Vec<Block> = (0..6)
            .map(|i| Block::Paragraph(Paragraph::from_text(format!("Recital {}", i))))
            .collect();
        blocks.insert(
            3,
            Block::Table(Table {
                properties: None,
                rows: vec![row("Fee"), row("NET 30 DAYS"), row("net 30 days")],
            }),
        );
        let d = Document {
            blocks,
            media: Vec::new(),
        };

        let full = locate(&d, "net 30 days").unwrap();
        assert_eq!(full.paragraph_index, 5);
        assert_eq!(full.strategy_used, MatchStrategy::Exact);
        for size in [1, 2, 4, 9] {
            assert_eq!(locate_chunked(&d, "net 30 days", size).as_ref(), Some(&full));
        }
    }

    #[test]
    fn test_case_insensitive_offsets_with_multibyte() {
        assert_eq!(find_case_insensitive("Ärger über X", "ÜBER"), Some(7..12));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  For:\t \u{a0}Company  "), "For: Company");
    }
}
