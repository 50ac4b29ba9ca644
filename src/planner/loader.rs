//! Loading modification batches from planner output files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::source::{ModificationSource, PlannerRequest};
use crate::redline::modification::{parse_planner_response, PlannerBatch};

/// Planner output saved to disk: a JSON array, an object with a
/// `modifications` array, or free text wrapping such an object
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    name: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "modifications".to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file
    pub fn load(&self) -> Result<PlannerBatch> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read modifications: {}", self.path.display()))?;
        let batch = parse_planner_response(&content)
            .with_context(|| format!("Failed to parse modifications: {}", self.path.display()))?;

        tracing::info!(
            "Loaded {} modifications from {} ({} malformed)",
            batch.modifications.len(),
            self.path.display(),
            batch.malformed.len()
        );
        Ok(batch)
    }
}

impl ModificationSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Planner output read from a JSON file"
    }

    fn modifications(&mut self, _request: &PlannerRequest<'_>) -> Result<PlannerBatch> {
        self.load()
    }
}

/// Open the source stored at `path`
pub fn load_source(path: &Path) -> Result<Box<dyn ModificationSource>> {
    if !path.is_file() {
        anyhow::bail!("Modification file not found: {}", path.display());
    }
    Ok(Box::new(JsonFileSource::new(path)))
}
