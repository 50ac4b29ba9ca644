//! The redline engine: locating targets and rewriting them as tracked changes

pub mod applier;
pub mod firm;
pub mod locator;
pub mod modification;
pub mod processor;
pub mod report;
pub mod session;
pub mod signature;
pub mod validator;
mod variants;

pub use applier::{apply, ApplyError, RevisionClock};
pub use firm::FirmDetails;
pub use locator::{locate, locate_chunked, MatchResult, MatchStrategy};
pub use modification::{parse_planner_response, Modification, ModificationKind, PlannerBatch};
pub use processor::BatchProcessor;
pub use report::{ModificationState, ProcessingReport, SkipReason, UnsafeContext};
pub use session::{RedlineSession, SessionOutcome};
pub use signature::{SignatureImage, SignaturePlacement};
pub use validator::validate;
