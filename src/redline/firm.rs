//! Firm and signer details used to fill signature blocks

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Context data supplied alongside a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmDetails {
    #[serde(alias = "name", alias = "firmName", alias = "company")]
    pub firm_name: Option<String>,
    #[serde(alias = "signatory_name", alias = "signerName", alias = "signer")]
    pub signer_name: Option<String>,
    #[serde(alias = "signer_title", alias = "signerTitle")]
    pub title: Option<String>,
    #[serde(alias = "recipient_name", alias = "recipientName")]
    pub recipient: Option<String>,
    #[serde(alias = "firm_address", alias = "firmAddress")]
    pub address: Option<String>,
    /// Any other keys, kept for reporting
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FirmDetails {
    /// Load details from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read firm details: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse firm details: {}", path.display()))
    }

    pub fn firm_name(&self) -> Option<&str> {
        present(&self.firm_name)
    }

    pub fn signer_name(&self) -> Option<&str> {
        present(&self.signer_name)
    }

    pub fn title(&self) -> Option<&str> {
        present(&self.title)
    }

    pub fn address(&self) -> Option<&str> {
        present(&self.address)
    }

    /// Name for the salutation line; the signer stands in when no recipient is given
    pub fn recipient(&self) -> Option<&str> {
        present(&self.recipient).or_else(|| self.signer_name())
    }

    /// Check whether no usable field is set
    pub fn is_empty(&self) -> bool {
        self.firm_name().is_none()
            && self.signer_name().is_none()
            && self.title().is_none()
            && self.address().is_none()
            && present(&self.recipient).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        let details: FirmDetails = serde_json::from_str(
            r#"{"name": "JMC Investment LLC", "signatory_name": "John Bagge", "title": "Vice President", "phone": "555"}"#,
        )
        .unwrap();
        assert_eq!(details.firm_name(), Some("JMC Investment LLC"));
        assert_eq!(details.signer_name(), Some("John Bagge"));
        assert_eq!(details.title(), Some("Vice President"));
        assert_eq!(details.recipient(), Some("John Bagge"));
        assert_eq!(details.extra["phone"], "555");
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let details = FirmDetails {
            firm_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(details.firm_name().is_none());
        assert!(details.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firm.json");
        std::fs::write(&path, r#"{"firm_name": "Acme"}"#).unwrap();
        assert_eq!(FirmDetails::load(&path).unwrap().firm_name(), Some("Acme"));
        assert!(FirmDetails::load(&dir.path().join("missing.json")).is_err());
    }
}
