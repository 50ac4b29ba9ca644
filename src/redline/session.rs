//! Redline session: parse, validate, process, sign, report

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::applier::RevisionClock;
use super::firm::FirmDetails;
use super::modification::{parse_planner_response, ModificationError, PlannerBatch};
use super::processor::BatchProcessor;
use super::report::{ProcessingReport, SkipReason};
use super::signature::{place_signature, SignatureImage};
use super::validator;
use crate::core::config::EngineConfig;
use crate::core::document::Document;
use crate::core::file_system::{self, LoadedDocument};
use crate::planner::{ModificationSource, PlannerRequest};

/// Below this share of applied modifications the session warns
const LOW_APPLICATION_RATE: f64 = 0.5;

/// Result of processing one file
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub report: ProcessingReport,
}

/// Everything needed to redline documents with one configuration
#[derive(Debug, Clone, Default)]
pub struct RedlineSession {
    config: EngineConfig,
    firm: FirmDetails,
    signature: Option<SignatureImage>,
}

impl RedlineSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            firm: FirmDetails::default(),
            signature: None,
        }
    }

    pub fn with_firm(mut self, firm: FirmDetails) -> Self {
        self.firm = firm;
        self
    }

    pub fn with_signature(mut self, signature: SignatureImage) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a parsed planner batch against an in-memory document
    pub fn run(&self, document: &mut Document, batch: PlannerBatch) -> ProcessingReport {
        let mut report = ProcessingReport::default();

        for entry in &batch.malformed {
            report.skip(entry.best_effort(), SkipReason::Malformed(entry.error.to_string()));
        }

        let validation = validator::review(&document.plain_text(), batch.modifications, &self.firm);
        for (modification, reason) in validation.rejected {
            report.skip(modification, reason);
        }

        let processed = BatchProcessor::new(&self.config).process(document, validation.accepted);
        report.merge(processed);

        if let Some(image) = &self.signature {
            let mut clock = RevisionClock::new(self.config.author.clone(), document.max_change_id());
            let placement = place_signature(document, image, &self.config.signature_labels, &mut clock);
            report.signature = Some(placement.to_string());
        }

        if report.submitted() > 0 && report.application_rate() < LOW_APPLICATION_RATE {
            tracing::warn!(
                "Low application rate: {} of {} modifications applied",
                report.applied,
                report.submitted()
            );
        }

        report
    }

    /// Run raw planner output against an in-memory document
    pub fn run_response(&self, document: &mut Document, response: &str) -> Result<ProcessingReport, ModificationError> {
        let batch = parse_planner_response(response)?;
        Ok(self.run(document, batch))
    }

    /// Load `input`, redline it with modifications from `source`, and save the result.
    ///
    /// Without an explicit `output` the file goes to the configured output directory.
    pub fn run_file(
        &self,
        input: &Path,
        source: &mut dyn ModificationSource,
        output: Option<&Path>,
    ) -> Result<SessionOutcome> {
        let mut loaded = LoadedDocument::open(input)
            .with_context(|| format!("Failed to open document: {}", input.display()))?;

        let text = loaded.document.plain_text();
        let batch = source
            .modifications(&PlannerRequest {
                document_text: &text,
                firm: &self.firm,
            })
            .with_context(|| format!("Modification source '{}' failed", source.name()))?;

        let report = self.run(&mut loaded.document, batch);

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => file_system::output_path(input, &self.config.output_dir)?,
        };
        loaded
            .save_as(&output, self.config.redline_mode)
            .with_context(|| format!("Failed to save document: {}", output.display()))?;

        Ok(SessionOutcome {
            input: input.to_path_buf(),
            output,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Paragraph;
    use crate::planner::StaticSource;
    use crate::redline::modification::Modification;
    use crate::redline::report::ModificationState;

    fn doc(paragraphs: &[&str]) -> Document {
        Document::from_paragraphs(paragraphs.iter().map(|t| Paragraph::from_text(*t)).collect())
    }

    #[test]
    fn test_run_counts_every_stage() {
        let mut d = doc(&["Confidentiality survives for three years.", "For: Company", "By:"]);
        let response = r#"{"modifications": [
            {"type": "TEXT_REPLACE", "current_text": "three years", "new_text": "two (2) years"},
            {"type": "TEXT_REPLACE", "current_text": "three years", "new_text": "two (2) years"},
            {"type": "TEXT_DELETE"},
            {"type": "TEXT_REPLACE", "current_text": "not in document", "new_text": "x"}
        ]}"#;
        let firm = FirmDetails {
            signer_name: Some("Jane Doe".into()),
            ..Default::default()
        };
        let report = RedlineSession::default()
            .with_firm(firm)
            .run_response(&mut d, response)
            .unwrap();

        // Replace plus the synthesized signer line
        assert_eq!(report.applied, 2);
        let reasons: Vec<&SkipReason> = report.skipped.iter().map(|s| &s.reason).collect();
        assert!(matches!(reasons[0], SkipReason::Malformed(_)));
        assert_eq!(reasons[1], &SkipReason::DuplicateInBatch);
        assert_eq!(reasons[2], &SkipReason::NotFound);
        assert_eq!(
            report.states,
            vec![
                ModificationState::Applied,
                ModificationState::Skipped,
                ModificationState::Applied
            ]
        );
        assert_eq!(d.paragraphs()[2].text(), "By: Jane Doe");
    }

    #[test]
    fn test_already_satisfied_document() {
        let mut d = doc(&["Confidentiality survives for two (2) years."]);
        let batch = PlannerBatch {
            modifications: vec![Modification::replace("three years", "two (2) years")],
            malformed: Vec::new(),
        };
        let report = RedlineSession::default().run(&mut d, batch);
        assert_eq!(report.applied, 0);
        assert_eq!(report.validator_rejections(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::DuplicateSatisfied);
    }

    #[test]
    fn test_signature_is_reported() {
        let mut d = doc(&["Body."]);
        let image = SignatureImage::from_bytes(vec![0], "sig.png", "image/png", 100);
        let report = RedlineSession::default()
            .with_signature(image)
            .run(&mut d, PlannerBatch::default());
        assert_eq!(report.signature.as_deref(), Some("appended as paragraph 1"));
        assert_eq!(d.media.len(), 1);
    }

    #[test]
    fn test_run_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("nda.json");
        let source_doc = doc(&["The term is three years."]);
        std::fs::write(&input, serde_json::to_string(&source_doc).unwrap()).unwrap();

        let config = EngineConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let mut source = StaticSource::new(vec![Modification::replace("three years", "two years")]);
        let outcome = RedlineSession::new(config).run_file(&input, &mut source, None).unwrap();

        assert_eq!(outcome.report.applied, 1);
        assert!(outcome.output.starts_with(dir.path().join("out")));
        let saved: Document = serde_json::from_str(&std::fs::read_to_string(&outcome.output).unwrap()).unwrap();
        assert_eq!(saved.plain_text(), "The term is two years.");
    }
}
