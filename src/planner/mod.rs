//! Modification sources: where a batch of edits comes from

pub mod loader;
pub mod source;

pub use loader::{load_source, JsonFileSource};
pub use source::{ModificationSource, PlannerRequest, StaticSource};
