//! The `.docx` zip container, kept as an ordered list of entries

use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::core::error::DocumentError;

/// All entries of a package in their original order
#[derive(Debug, Clone, Default)]
pub struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    pub fn new(entries: Vec<(String, Vec<u8>)>) -> Self {
        Self { entries }
    }

    /// Read a package from disk
    pub fn read(path: &Path) -> Result<Self, DocumentError> {
        let file = std::fs::File::open(path)?;
        let package = Self::from_reader(file)?;
        tracing::debug!("Read {} package entries from {}", package.entries.len(), path.display());
        Ok(package)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DocumentError> {
        Self::from_reader(Cursor::new(data))
    }

    fn from_reader<R: Read + std::io::Seek>(reader: R) -> Result<Self, DocumentError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            entries.push((name, data));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, Vec<u8>)] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Entry content as UTF-8 text
    pub fn entry_text(&self, name: &str) -> Result<String, DocumentError> {
        let data = self
            .entry(name)
            .ok_or_else(|| DocumentError::MissingPart(name.to_string()))?;
        String::from_utf8(data.to_vec()).map_err(|e| DocumentError::Xml(format!("{} is not UTF-8: {}", name, e)))
    }

    /// Replace an entry, or append it when the package has none by that name
    pub fn set_entry(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some((_, existing)) => *existing = data,
            None => self.entries.push((name.to_string(), data)),
        }
    }

    /// Write the package to disk
    pub fn write(&self, path: &Path) -> Result<(), DocumentError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Serialize the package. Media is stored, everything else deflated.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for (name, data) in &self.entries {
            let options = if name.starts_with("word/media/") { stored } else { deflated };
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}
