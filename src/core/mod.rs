//! Core functionality: the document model, configuration, errors, and file operations

pub mod config;
pub mod document;
pub mod error;
pub mod file_system;
