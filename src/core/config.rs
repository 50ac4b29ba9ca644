//! Engine configuration management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// How tracked changes are rendered when the document is written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedlineMode {
    /// Native revision marks (`w:ins` / `w:del`)
    #[default]
    Native,
    /// Plain runs styled with strikethrough / underline
    Visual,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Author recorded on every tracked change
    pub author: String,
    /// Rendering of tracked changes on output
    pub redline_mode: RedlineMode,
    /// Paragraph count above which chunked execution is used
    pub chunk_threshold: usize,
    /// Paragraphs per chunk
    pub chunk_size: usize,
    /// Directory for generated output documents
    pub output_dir: PathBuf,
    /// Line labels that mark a signature line
    pub signature_labels: Vec<String>,
    /// Rendered signature width in EMU
    pub signature_width_emu: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: "Redliner".to_string(),
            redline_mode: RedlineMode::Native,
            chunk_threshold: 1000,
            chunk_size: 500,
            output_dir: PathBuf::from("outputs"),
            signature_labels: vec![
                "Signed:".to_string(),
                "Signature:".to_string(),
                "By:".to_string(),
            ],
            // 1.2 inches
            signature_width_emu: 1_097_280,
        }
    }
}

impl EngineConfig {
    /// Get the default config file path
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "redliner", "Redliner")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from the default location, or defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Whether a document of this many paragraphs runs in chunks
    pub fn use_chunks(&self, paragraph_count: usize) -> bool {
        paragraph_count > self.chunk_threshold
    }

    fn sanitized(mut self) -> Self {
        // A zero chunk size would never make progress
        if self.chunk_size == 0 {
            self.chunk_size = Self::default().chunk_size;
        }
        self
    }
}
