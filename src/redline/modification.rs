//! Modifications: externally supplied edit instructions
//!
//! Planner output uses a JSON shape of
//! `{type, section, current_text, new_text, reason, location_hint}`.
//! Entries missing a field their kind requires are reported as malformed
//! and never reach the validator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a modification does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    #[serde(rename = "TEXT_REPLACE")]
    Replace,
    #[serde(rename = "TEXT_INSERT")]
    Insert,
    #[serde(rename = "TEXT_DELETE")]
    Delete,
    #[serde(rename = "CLAUSE_ADD")]
    ClauseAdd,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModificationError {
    #[error("missing required field `{field}`")]
    Malformed { field: &'static str },

    #[error("unknown modification type: {0}")]
    UnknownKind(String),

    #[error("planner response contains no JSON")]
    NoJson,

    #[error("planner response is not valid JSON: {0}")]
    InvalidJson(String),
}

/// One intended text edit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modification {
    #[serde(rename = "type")]
    pub kind: ModificationKind,
    #[serde(rename = "current_text", default, skip_serializing_if = "Option::is_none")]
    pub target_text: Option<String>,
    #[serde(rename = "new_text", default, skip_serializing_if = "Option::is_none")]
    pub replacement_text: Option<String>,
    #[serde(default)]
    pub section: String,
    #[serde(rename = "reason", default)]
    pub rationale: String,
    #[serde(default)]
    pub location_hint: String,
}

/// Planner entry before field requirements are checked
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawModification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub section: Option<String>,
    pub current_text: Option<String>,
    pub new_text: Option<String>,
    pub reason: Option<String>,
    pub location_hint: Option<String>,
}

/// A planner entry that could not be turned into a modification
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEntry {
    /// The entry as received
    pub raw: serde_json::Value,
    pub error: ModificationError,
}

impl MalformedEntry {
    /// Whatever fields the entry did carry, for reporting
    pub fn best_effort(&self) -> Modification {
        let field = |name: &str| self.raw.get(name).and_then(|v| v.as_str()).map(str::to_string);
        let kind = field("type")
            .and_then(|kind| kind.parse().ok())
            .unwrap_or(ModificationKind::Replace);
        Modification {
            kind,
            target_text: field("current_text"),
            replacement_text: field("new_text"),
            section: field("section").unwrap_or_default(),
            rationale: field("reason").unwrap_or_default(),
            location_hint: field("location_hint").unwrap_or_default(),
        }
    }
}

/// Result of parsing a planner response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannerBatch {
    pub modifications: Vec<Modification>,
    pub malformed: Vec<MalformedEntry>,
}

impl FromStr for ModificationKind {
    type Err = ModificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT_REPLACE" | "REPLACE" => Ok(Self::Replace),
            "TEXT_INSERT" | "INSERT" => Ok(Self::Insert),
            "TEXT_DELETE" | "DELETE" => Ok(Self::Delete),
            "CLAUSE_ADD" | "CLAUSEADD" => Ok(Self::ClauseAdd),
            _ => Err(ModificationError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Replace => "TEXT_REPLACE",
            Self::Insert => "TEXT_INSERT",
            Self::Delete => "TEXT_DELETE",
            Self::ClauseAdd => "CLAUSE_ADD",
        };
        f.write_str(name)
    }
}

impl Modification {
    fn new(kind: ModificationKind, target: Option<String>, replacement: Option<String>) -> Self {
        Self {
            kind,
            target_text: target,
            replacement_text: replacement,
            section: String::new(),
            rationale: String::new(),
            location_hint: String::new(),
        }
    }

    /// Replace `target` with `replacement`
    pub fn replace(target: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self::new(ModificationKind::Replace, Some(target.into()), Some(replacement.into()))
    }

    /// Insert a new paragraph of `text`
    pub fn insert(text: impl Into<String>) -> Self {
        Self::new(ModificationKind::Insert, None, Some(text.into()))
    }

    /// Delete `target`
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(ModificationKind::Delete, Some(target.into()), None)
    }

    /// Append a new clause paragraph
    pub fn clause(text: impl Into<String>) -> Self {
        Self::new(ModificationKind::ClauseAdd, None, Some(text.into()))
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_location_hint(mut self, hint: impl Into<String>) -> Self {
        self.location_hint = hint.into();
        self
    }

    /// Target text, empty when absent
    pub fn target(&self) -> &str {
        self.target_text.as_deref().unwrap_or("")
    }

    /// Replacement text, empty when absent
    pub fn replacement(&self) -> &str {
        self.replacement_text.as_deref().unwrap_or("")
    }

    /// Whether this kind locates existing text
    pub fn needs_target(&self) -> bool {
        matches!(self.kind, ModificationKind::Replace | ModificationKind::Delete)
    }

    /// Whether this kind writes new text
    pub fn needs_replacement(&self) -> bool {
        !matches!(self.kind, ModificationKind::Delete)
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: '{}' -> '{}'", self.kind, self.target(), self.replacement())
    }
}

impl TryFrom<RawModification> for Modification {
    type Error = ModificationError;

    fn try_from(raw: RawModification) -> Result<Self, Self::Error> {
        let kind: ModificationKind = raw
            .kind
            .as_deref()
            .ok_or(ModificationError::Malformed { field: "type" })?
            .parse()?;

        let modification = Modification {
            kind,
            target_text: raw.current_text,
            replacement_text: raw.new_text,
            section: raw.section.unwrap_or_default(),
            rationale: raw.reason.unwrap_or_default(),
            location_hint: raw.location_hint.unwrap_or_default(),
        };

        if modification.needs_target() && modification.target_text.is_none() {
            return Err(ModificationError::Malformed { field: "current_text" });
        }
        if modification.needs_replacement() && modification.replacement_text.is_none() {
            return Err(ModificationError::Malformed { field: "new_text" });
        }

        Ok(modification)
    }
}

/// Parse a planner response into modifications.
///
/// Accepts a JSON array of entries, an object with a `modifications` array,
/// a single entry object, or free text wrapping such an object.
pub fn parse_planner_response(text: &str) -> Result<PlannerBatch, ModificationError> {
    let value = extract_json(text)?;

    let entries = match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut object) => match object.remove("modifications") {
            Some(serde_json::Value::Array(entries)) => entries,
            Some(_) => Vec::new(),
            None if object.contains_key("type") => vec![serde_json::Value::Object(object)],
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    let mut batch = PlannerBatch::default();
    for entry in entries {
        let parsed = serde_json::from_value::<RawModification>(entry.clone())
            .map_err(|_| ModificationError::Malformed { field: "type" })
            .and_then(Modification::try_from);

        match parsed {
            Ok(modification) => batch.modifications.push(modification),
            Err(error) => {
                tracing::warn!("Dropping malformed planner entry: {} ({})", entry, error);
                batch.malformed.push(MalformedEntry { raw: entry, error });
            }
        }
    }

    tracing::debug!(
        "Parsed {} modifications ({} malformed)",
        batch.modifications.len(),
        batch.malformed.len()
    );
    Ok(batch)
}

fn extract_json(text: &str) -> Result<serde_json::Value, ModificationError> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }

    // Free text around a JSON object
    let start = text.find('{').ok_or(ModificationError::NoJson)?;
    let end = text.rfind('}').ok_or(ModificationError::NoJson)?;
    if end < start {
        return Err(ModificationError::NoJson);
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| ModificationError::InvalidJson(e.to_string()))
}
