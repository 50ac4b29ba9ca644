//! Redliner - tracked-change redlining for word-processing documents
//!
//! Locates the spans a list of requested modifications points at and rewrites
//! them as tracked changes, leaving untouched formatting as it was.

pub mod core;
pub mod docx;
pub mod planner;
pub mod redline;
