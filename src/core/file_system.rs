//! File operations: loading and saving documents, discovering inputs, naming outputs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use super::config::RedlineMode;
use super::document::Document;
use super::error::DocumentError;
use crate::docx::{self, DocxPackage};

/// Marker inserted into generated file names
const OUTPUT_MARKER: &str = "_redlined_";

/// On-disk format of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Docx,
}

impl DocumentFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        match path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("json") => Ok(Self::Json),
            Some("docx") => Ok(Self::Docx),
            _ => Err(DocumentError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A document together with what is needed to write it back
#[derive(Debug)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub document: Document,
    package: Option<DocxPackage>,
}

impl LoadedDocument {
    /// Load a document from disk
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        let (document, package) = match DocumentFormat::from_path(path)? {
            DocumentFormat::Json => {
                let content = std::fs::read_to_string(path)?;
                (serde_json::from_str(&content)?, None)
            }
            DocumentFormat::Docx => {
                let package = DocxPackage::read(path)?;
                (docx::read_document(&package)?, Some(package))
            }
        };

        tracing::info!(
            "Loaded document: {} ({} paragraphs)",
            path.display(),
            document.paragraph_count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            document,
            package,
        })
    }

    /// Write the document to `path`
    pub fn save_as(&self, path: &Path, mode: RedlineMode) -> Result<(), DocumentError> {
        match DocumentFormat::from_path(path)? {
            DocumentFormat::Json => {
                let content = serde_json::to_string_pretty(&self.document)?;
                std::fs::write(path, content)?;
            }
            DocumentFormat::Docx => {
                let package = self.package.as_ref().ok_or_else(|| {
                    DocumentError::UnsupportedFormat(format!(
                        "{} was not loaded from a .docx package",
                        self.path.display()
                    ))
                })?;
                docx::write_document(package, &self.document, mode)?.write(path)?;
            }
        }

        tracing::info!("Saved document: {}", path.display());
        Ok(())
    }
}

/// Build the output path for a processed document:
/// `{output_dir}/{stem}_redlined_{YYYYmmdd_HHMMSS}{.ext}`
pub fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let extension = input
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");

    Ok(output_dir.join(format!("{}{}{}{}", stem, OUTPUT_MARKER, timestamp, extension)))
}

/// Find every processable document under a directory, in a stable order.
/// Hidden entries and previously generated outputs are skipped.
pub fn find_documents(path: &Path) -> Vec<PathBuf> {
    let mut documents: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| DocumentFormat::from_path(e.path()).is_ok())
        .filter(|e| !e.file_name().to_string_lossy().contains(OUTPUT_MARKER))
        .map(|e| e.path().to_path_buf())
        .collect();
    documents.sort();
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Paragraph;

    #[test]
    fn test_output_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("outputs");
        let path = output_path(Path::new("/tmp/nda.docx"), &out_dir).unwrap();

        assert!(out_dir.is_dir());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("nda_redlined_"));
        assert!(name.ends_with(".docx"));
        // nda_redlined_YYYYmmdd_HHMMSS.docx
        assert_eq!(name.len(), "nda_redlined_".len() + 15 + ".docx".len());
    }

    #[test]
    fn test_find_documents_skips_outputs_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.docx"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::write(dir.path().join("a_redlined_20240101_000000.docx"), "").unwrap();
        std::fs::create_dir(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join(".cache").join("c.json"), "{}").unwrap();

        let found: Vec<String> = find_documents(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(found, vec!["a.docx", "b.json"]);
    }

    #[test]
    fn test_json_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = Document::from_paragraphs(vec![Paragraph::from_text("Hello")]);
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let loaded = LoadedDocument::open(&path).unwrap();
        assert_eq!(loaded.document, doc);

        let out = dir.path().join("out.json");
        loaded.save_as(&out, RedlineMode::Native).unwrap();
        assert!(out.exists());
        assert!(loaded.save_as(&dir.path().join("out.docx"), RedlineMode::Native).is_err());
    }

    #[test]
    fn test_docx_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nda.docx");
        let body = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Term of three years.</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        DocxPackage::new(vec![
            ("word/document.xml".into(), body.as_bytes().to_vec()),
            ("word/styles.xml".into(), b"<w:styles/>".to_vec()),
        ])
        .write(&path)
        .unwrap();

        let mut loaded = LoadedDocument::open(&path).unwrap();
        assert_eq!(loaded.document.plain_text(), "Term of three years.");
        loaded.document.push_paragraph(Paragraph::from_text("Added."));

        let out = dir.path().join("out.docx");
        loaded.save_as(&out, RedlineMode::Native).unwrap();
        let reopened = LoadedDocument::open(&out).unwrap();
        assert_eq!(reopened.document.plain_text(), "Term of three years.\nAdded.");

        let package = DocxPackage::read(&out).unwrap();
        assert_eq!(package.entry("word/styles.xml"), Some(&b"<w:styles/>"[..]));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(DocumentFormat::from_path(Path::new("file.pdf")).is_err());
        assert_eq!(DocumentFormat::from_path(Path::new("x.DOCX")).unwrap(), DocumentFormat::Docx);
    }
}
