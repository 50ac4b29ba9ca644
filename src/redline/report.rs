//! Processing report: per-modification outcome and skip taxonomy

use serde::Serialize;
use thiserror::Error;

use super::applier::ApplyError;
use super::modification::Modification;

/// Why the validator considered a target unsafe to rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeContext {
    /// The term is being defined here, e.g. `(the "Company")`
    DefiningOccurrence,
    /// The term only occurs inside running prose
    EmbeddedInProse,
    /// A date would be stamped onto text that is not a fill-in field
    DateOnProse,
}

/// Why a modification was not applied
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("target text not found")]
    NotFound,

    #[error("target or replacement text is empty")]
    EmptyOperands,

    #[error("span could not be resolved: {0}")]
    ApplyConflict(String),

    #[error("malformed modification: {0}")]
    Malformed(String),

    #[error("unsafe context: {0:?}")]
    UnsafeContext(UnsafeContext),

    #[error("document already contains the replacement")]
    DuplicateSatisfied,

    #[error("duplicate of an earlier modification in the batch")]
    DuplicateInBatch,
}

impl SkipReason {
    /// Whether the validator dropped the modification before processing
    pub fn is_validator_rejection(&self) -> bool {
        matches!(
            self,
            SkipReason::UnsafeContext(_) | SkipReason::DuplicateSatisfied | SkipReason::DuplicateInBatch
        )
    }
}

impl From<ApplyError> for SkipReason {
    fn from(error: ApplyError) -> Self {
        match error {
            ApplyError::NotFound => SkipReason::NotFound,
            ApplyError::EmptyOperands => SkipReason::EmptyOperands,
            ApplyError::ApplyConflict(detail) => SkipReason::ApplyConflict(detail),
        }
    }
}

/// Lifecycle of one modification inside a batch.
/// `Applied` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationState {
    Pending,
    Located,
    Applied,
    Skipped,
}

impl ModificationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ModificationState::Applied | ModificationState::Skipped)
    }

    /// Move to `next` if the lifecycle allows it
    pub fn advance(self, next: ModificationState) -> ModificationState {
        use ModificationState::*;
        match (self, next) {
            (Pending, Located) | (Pending, Skipped) | (Located, Applied) | (Located, Skipped) => next,
            _ => self,
        }
    }
}

/// A modification that was not applied, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedModification {
    pub modification: Modification,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Outcome of processing one document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub applied: usize,
    pub skipped: Vec<SkippedModification>,
    /// Final state of each processed modification, in list order
    pub states: Vec<ModificationState>,
    /// Where the signature image went, when one was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ProcessingReport {
    /// Record a modification that never reached the processor
    pub fn skip(&mut self, modification: Modification, reason: SkipReason) {
        self.skipped.push(SkippedModification { modification, reason });
    }

    /// Number of modifications submitted, applied or not
    pub fn submitted(&self) -> usize {
        self.applied + self.skipped.len()
    }

    /// Fraction of submitted modifications that were applied
    pub fn application_rate(&self) -> f64 {
        match self.submitted() {
            0 => 1.0,
            n => self.applied as f64 / n as f64,
        }
    }

    /// Skips attributed to the validator
    pub fn validator_rejections(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.reason.is_validator_rejection())
            .count()
    }

    /// Fold another report into this one, keeping list order
    pub fn merge(&mut self, other: ProcessingReport) {
        self.applied += other.applied;
        self.skipped.extend(other.skipped);
        self.states.extend(other.states);
        if other.signature.is_some() {
            self.signature = other.signature;
        }
    }
}
