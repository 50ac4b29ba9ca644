//! Modification source API

use anyhow::Result;

use crate::redline::firm::FirmDetails;
use crate::redline::modification::{Modification, PlannerBatch};

/// What a source is told about the document it plans for
#[derive(Debug, Clone, Copy)]
pub struct PlannerRequest<'a> {
    /// Plain text of the document, one line per paragraph
    pub document_text: &'a str,
    pub firm: &'a FirmDetails,
}

/// Anything that can produce a modification batch for a document.
///
/// The engine never calls back into a source once processing has started;
/// the whole batch is requested up front.
pub trait ModificationSource {
    /// Get the source name
    fn name(&self) -> &str;

    /// Get the source description
    fn description(&self) -> &str {
        ""
    }

    /// Produce the modifications for one document
    fn modifications(&mut self, request: &PlannerRequest<'_>) -> Result<PlannerBatch>;
}

/// A fixed list of modifications, handed out unchanged for every document
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    modifications: Vec<Modification>,
}

impl StaticSource {
    pub fn new(modifications: Vec<Modification>) -> Self {
        Self { modifications }
    }
}

impl ModificationSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn modifications(&mut self, _request: &PlannerRequest<'_>) -> Result<PlannerBatch> {
        Ok(PlannerBatch {
            modifications: self.modifications.clone(),
            malformed: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_repeats_batch() {
        let mut source = StaticSource::new(vec![Modification::delete("x")]);
        let firm = FirmDetails::default();
        let request = PlannerRequest {
            document_text: "x",
            firm: &firm,
        };
        assert_eq!(source.modifications(&request).unwrap().modifications.len(), 1);
        assert_eq!(source.modifications(&request).unwrap().modifications.len(), 1);
        assert_eq!(source.name(), "static");
    }
}
