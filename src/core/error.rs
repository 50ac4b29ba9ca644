//! Error types for loading and saving documents

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed document markup: {0}")]
    Xml(String),

    #[error("Package part missing: {0}")]
    MissingPart(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}
