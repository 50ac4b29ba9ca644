//! Change applier
//!
//! Rewrites a matched span as tracked changes. The run window holding the
//! span is rebuilt as: untouched prefix runs, one deletion per source run
//! the span covered (each keeping that run's formatting), one insertion,
//! untouched suffix runs. Opaque markup keeps its relative order and lands
//! in the prefix or suffix. The new segments are spliced over the old window.

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

use super::locator::MatchResult;
use crate::core::document::{ChangeKind, ChangeRecord, Paragraph, Run, RunFormat, RunWindow, Segment};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("target text not found")]
    NotFound,

    #[error("target or replacement text is empty")]
    EmptyOperands,

    #[error("span could not be resolved to runs: {0}")]
    ApplyConflict(String),
}

/// Issues tracked-change records with unique ids for one document
#[derive(Debug, Clone)]
pub struct RevisionClock {
    author: String,
    timestamp: DateTime<Utc>,
    next_id: u32,
}

impl RevisionClock {
    /// Create a clock whose ids start after `last_id`
    pub fn new(author: impl Into<String>, last_id: u32) -> Self {
        Self {
            author: author.into(),
            timestamp: Utc::now().trunc_subsecs(0),
            next_id: last_id + 1,
        }
    }

    /// Use a fixed timestamp for every record
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Id the next record will receive
    pub fn peek_id(&self) -> u32 {
        self.next_id
    }

    /// Produce a new change record
    pub fn record(&mut self, kind: ChangeKind, text: impl Into<String>, formatting: RunFormat) -> ChangeRecord {
        let id = self.next_id;
        self.next_id += 1;
        ChangeRecord {
            id,
            author: self.author.clone(),
            timestamp: self.timestamp,
            kind,
            text: text.into(),
            formatting,
        }
    }
}

/// A matched span split out of its window
struct SplitSpan {
    segments: std::ops::Range<usize>,
    prefix: Vec<Segment>,
    matched: Vec<Run>,
    suffix: Vec<Segment>,
}

/// Replace the matched span with a deletion of the old text and an
/// insertion of `replacement`
pub fn apply(
    paragraph: &mut Paragraph,
    found: &MatchResult,
    replacement: &str,
    clock: &mut RevisionClock,
) -> Result<(), ApplyError> {
    if found.located_text.is_empty() || replacement.is_empty() {
        return Err(ApplyError::EmptyOperands);
    }
    rewrite(paragraph, found, Some(replacement), clock)
}

/// Wrap the matched span in a deletion, with no paired insertion
pub fn apply_deletion(
    paragraph: &mut Paragraph,
    found: &MatchResult,
    clock: &mut RevisionClock,
) -> Result<(), ApplyError> {
    if found.located_text.is_empty() {
        return Err(ApplyError::EmptyOperands);
    }
    rewrite(paragraph, found, None, clock)
}

/// Build a new paragraph that is one insertion spanning its whole text
pub fn insertion_paragraph(text: &str, clock: &mut RevisionClock) -> Result<Paragraph, ApplyError> {
    if text.is_empty() {
        return Err(ApplyError::EmptyOperands);
    }
    let record = clock.record(ChangeKind::Insertion, text, RunFormat::default());
    Ok(Paragraph {
        properties: None,
        segments: vec![Segment::Change(record)],
    })
}

fn rewrite(
    paragraph: &mut Paragraph,
    found: &MatchResult,
    replacement: Option<&str>,
    clock: &mut RevisionClock,
) -> Result<(), ApplyError> {
    let (window, range) = resolve_span(paragraph, found)?;
    let split = split_window(paragraph, &window, range)?;

    let mut segments = split.prefix;
    let insertion_format = split
        .matched
        .first()
        .map(|run| run.format.clone())
        .unwrap_or_default();
    for run in split.matched {
        segments.push(Segment::Change(clock.record(
            ChangeKind::Deletion,
            run.text,
            run.format,
        )));
    }
    if let Some(text) = replacement {
        segments.push(Segment::Change(clock.record(
            ChangeKind::Insertion,
            text,
            insertion_format,
        )));
    }
    segments.extend(split.suffix);

    paragraph.splice(split.segments, segments);
    Ok(())
}

/// Re-verify the match against the paragraph as it is now
fn resolve_span(
    paragraph: &Paragraph,
    found: &MatchResult,
) -> Result<(RunWindow, std::ops::Range<usize>), ApplyError> {
    let windows = paragraph.run_windows();

    if let Some(window) = windows.get(found.window) {
        if window.text.get(found.range.clone()) == Some(found.located_text.as_str()) {
            let range = found.range.clone();
            return Ok((window.clone(), range));
        }
    }

    // The paragraph moved under us; fall back to the first verbatim occurrence
    windows
        .into_iter()
        .find_map(|window| {
            let start = window.text.find(&found.located_text)?;
            let range = start..start + found.located_text.len();
            Some((window, range))
        })
        .ok_or(ApplyError::NotFound)
}

fn split_window(
    paragraph: &Paragraph,
    window: &RunWindow,
    range: std::ops::Range<usize>,
) -> Result<SplitSpan, ApplyError> {
    let mut prefix = Vec::new();
    let mut matched = Vec::new();
    let mut suffix = Vec::new();
    let mut offset = 0;

    for index in window.segments.clone() {
        let run = match paragraph.segments.get(index) {
            Some(Segment::Run(run)) => run,
            // Markup inside the span moves after the insertion
            Some(raw @ Segment::Raw { .. }) => {
                if offset <= range.start {
                    prefix.push(raw.clone());
                } else {
                    suffix.push(raw.clone());
                }
                continue;
            }
            _ => {
                return Err(ApplyError::ApplyConflict(format!(
                    "segment {} is not a run",
                    index
                )));
            }
        };
        let run_start = offset;
        let run_end = offset + run.text.len();
        offset = run_end;

        let cut = |from: usize, to: usize| -> Result<Option<Run>, ApplyError> {
            let from = from.clamp(run_start, run_end) - run_start;
            let to = to.clamp(run_start, run_end) - run_start;
            if from >= to {
                return Ok(None);
            }
            let text = run.text.get(from..to).ok_or_else(|| {
                ApplyError::ApplyConflict(format!("offset {}..{} splits a character", from, to))
            })?;
            Ok(Some(Run::with_format(text, run.format.clone())))
        };

        if let Some(piece) = cut(run_start, range.start)? {
            prefix.push(Segment::Run(piece));
        }
        if let Some(piece) = cut(range.start, range.end)? {
            matched.push(piece);
        }
        if let Some(piece) = cut(range.end, run_end)? {
            suffix.push(Segment::Run(piece));
        }
    }

    if matched.is_empty() {
        return Err(ApplyError::ApplyConflict("span covers no run text".to_string()));
    }

    Ok(SplitSpan {
        segments: window.segments.clone(),
        prefix,
        matched,
        suffix,
    })
}
