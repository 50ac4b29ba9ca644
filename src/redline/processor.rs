//! Batch processor
//!
//! Applies a modification list to one document, strictly in list order.
//! Large documents are scanned in paragraph chunks; chunking only changes
//! how the locator walks the paragraphs, never which paragraph a
//! modification lands in.

use super::applier::{self, RevisionClock};
use super::locator::{self, MatchResult};
use super::modification::{Modification, ModificationKind};
use super::report::{ModificationState, ProcessingReport, SkipReason};
use crate::core::config::EngineConfig;
use crate::core::document::{Document, Placement};

/// Batches larger than this log progress while running in chunks
const PROGRESS_LOG_MIN: usize = 10;

/// Progress callback: (modifications processed, total)
pub type ProgressCallback = Box<dyn FnMut(usize, usize)>;

/// Drives locate-then-apply across a document
pub struct BatchProcessor {
    config: EngineConfig,
    on_progress: Option<ProgressCallback>,
}

impl BatchProcessor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.clone(),
            on_progress: None,
        }
    }

    /// Report progress after every modification
    pub fn with_progress(mut self, callback: impl FnMut(usize, usize) + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Apply `modifications` to `document` in order.
    ///
    /// A failed modification is recorded and processing moves on.
    pub fn process(&mut self, document: &mut Document, modifications: Vec<Modification>) -> ProcessingReport {
        let paragraph_count = document.paragraph_count();
        let chunked = self.config.use_chunks(paragraph_count);
        let chunk_size = if chunked { self.config.chunk_size.max(1) } else { usize::MAX };
        if chunked {
            tracing::info!(
                "Processing {} paragraphs in chunks of {}",
                paragraph_count,
                chunk_size
            );
        }

        let mut clock = RevisionClock::new(self.config.author.clone(), document.max_change_id());
        let mut report = ProcessingReport::default();
        let total = modifications.len();

        for (index, modification) in modifications.into_iter().enumerate() {
            let mut state = ModificationState::Pending;
            match apply_one(document, &modification, chunk_size, &mut state, &mut clock) {
                Ok(()) => {
                    state = state.advance(ModificationState::Applied);
                    tracing::info!("Applied {}", modification);
                    report.applied += 1;
                }
                Err(reason) => {
                    state = state.advance(ModificationState::Skipped);
                    tracing::warn!("Skipped {}: {}", modification, reason);
                    report.skip(modification, reason);
                }
            }
            report.states.push(state);

            let processed = index + 1;
            if chunked && total > PROGRESS_LOG_MIN && processed % PROGRESS_LOG_MIN == 0 {
                tracing::info!("Progress: {}/{} modifications", processed, total);
            }
            if let Some(callback) = self.on_progress.as_mut() {
                callback(processed, total);
            }
        }

        tracing::info!(
            "Processed {} modifications: {} applied, {} skipped",
            total,
            report.applied,
            report.skipped.len()
        );
        report
    }
}

fn apply_one(
    document: &mut Document,
    modification: &Modification,
    chunk_size: usize,
    state: &mut ModificationState,
    clock: &mut RevisionClock,
) -> Result<(), SkipReason> {
    match modification.kind {
        ModificationKind::Replace => {
            if modification.target().is_empty() || modification.replacement().is_empty() {
                return Err(SkipReason::EmptyOperands);
            }
            let found = locate_target(document, modification.target(), chunk_size, state)?;
            let paragraph = document
                .paragraph_mut(found.paragraph_index)
                .ok_or(SkipReason::NotFound)?;
            applier::apply(paragraph, &found, modification.replacement(), clock)?;
        }
        ModificationKind::Delete => {
            if modification.target().is_empty() {
                return Err(SkipReason::EmptyOperands);
            }
            let found = locate_target(document, modification.target(), chunk_size, state)?;
            let paragraph = document
                .paragraph_mut(found.paragraph_index)
                .ok_or(SkipReason::NotFound)?;
            applier::apply_deletion(paragraph, &found, clock)?;
        }
        ModificationKind::Insert => {
            let paragraph = applier::insertion_paragraph(modification.replacement(), clock)?;
            let anchor = parse_anchor(&modification.location_hint)
                .and_then(|(placement, text)| Some((placement, locator::locate_chunked(document, text, chunk_size)?)));
            *state = state.advance(ModificationState::Located);

            match anchor {
                Some((placement, found)) => {
                    if !document.insert_paragraph(found.paragraph_index, placement, paragraph) {
                        return Err(SkipReason::ApplyConflict(format!(
                            "anchor paragraph {} vanished",
                            found.paragraph_index
                        )));
                    }
                }
                None => {
                    document.push_paragraph(paragraph);
                }
            }
        }
        ModificationKind::ClauseAdd => {
            let paragraph = applier::insertion_paragraph(modification.replacement(), clock)?;
            *state = state.advance(ModificationState::Located);
            document.push_paragraph(paragraph);
        }
    }
    Ok(())
}

fn locate_target(
    document: &Document,
    target: &str,
    chunk_size: usize,
    state: &mut ModificationState,
) -> Result<MatchResult, SkipReason> {
    let found = locator::locate_chunked(document, target, chunk_size).ok_or(SkipReason::NotFound)?;
    *state = state.advance(ModificationState::Located);
    Ok(found)
}

/// Read "After <text>" / "Before <text>" from a location hint
fn parse_anchor(hint: &str) -> Option<(Placement, &str)> {
    let hint = hint.trim();
    let starts_with = |prefix: &str| {
        hint.get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
    };
    let (placement, rest) = if starts_with("after ") {
        (Placement::After, &hint[6..])
    } else if starts_with("before ") {
        (Placement::Before, &hint[7..])
    } else {
        return None;
    };

    let text = rest.trim().trim_matches(['"', '\'']);
    if text.is_empty() {
        None
    } else {
        Some((placement, text))
    }
}
