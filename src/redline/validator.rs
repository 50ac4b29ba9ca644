//! Modification validator
//!
//! Filters a planner batch against the document text before anything is
//! located. Steps run in a fixed order: placeholder expansion, unsafe
//! context rejection, the date rule, duplicate suppression, and finally
//! synthesis of signature-block fills the planner did not ask for.
//!
//! The context heuristics encode a policy rather than a grammar: a generic
//! term is only rewritten where it reads as a fill-in field, never where
//! the document defines it or uses it inside running prose.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::firm::FirmDetails;
use super::locator::{self, normalize_whitespace};
use super::modification::{Modification, ModificationKind};
use super::report::{SkipReason, UnsafeContext};

/// Lines with more words than this count as running prose
const PROSE_WORDS: usize = 12;
const GENERIC_TERM_MAX_WORDS: usize = 3;
const GENERIC_TERM_MAX_LEN: usize = 40;
const FIELD_LABEL_MAX_LEN: usize = 30;

const MONTHS: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = format!(
            r"(?i)\b(?:{m})\.?[ \t]+\d{{1,2}}(?:st|nd|rd|th)?,?[ \t]+\d{{4}}\b|\b\d{{1,2}}(?:st|nd|rd|th)?[ \t]+(?:{m})\.?,?[ \t]+\d{{4}}\b|\b\d{{1,2}}/\d{{1,2}}/\d{{2,4}}\b|\b\d{{4}}-\d{{2}}-\d{{2}}\b",
            m = MONTHS
        );
        Regex::new(&pattern).expect("date pattern is valid")
    })
}

/// Text before a value on a "Label: value" line
fn label_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[ \t]*[A-Z][A-Za-z ]{0,24}:[ \t]*$").expect("label prefix pattern is valid")
    })
}

/// A target that starts with a field label
fn labelled_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[ \t]*[A-Z][A-Za-z ]{0,24}:").expect("label pattern is valid"))
}

fn bracket_placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[A-Z][A-Z_ ]*\]").expect("placeholder pattern is valid"))
}

/// Result of validating a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    /// Modifications to process, in submission order, synthesized ones last
    pub accepted: Vec<Modification>,
    /// Dropped modifications with the reason
    pub rejected: Vec<(Modification, SkipReason)>,
}

/// Clean a batch, returning only the modifications worth processing
pub fn validate(document_text: &str, modifications: Vec<Modification>, context: &FirmDetails) -> Vec<Modification> {
    review(document_text, modifications, context).accepted
}

/// Clean a batch, keeping the dropped entries and their reasons
pub fn review(document_text: &str, modifications: Vec<Modification>, context: &FirmDetails) -> Validation {
    let normalized_doc = normalize_whitespace(document_text);
    let mut validation = Validation::default();
    let mut seen = HashSet::new();

    for modification in modifications {
        let modification = expand_placeholder(document_text, modification);
        match check(document_text, &normalized_doc, modification) {
            Ok(modification) => {
                if seen.insert(batch_key(&modification)) {
                    validation.accepted.push(modification);
                } else {
                    reject(&mut validation, modification, SkipReason::DuplicateInBatch);
                }
            }
            Err((modification, reason)) => reject(&mut validation, modification, reason),
        }
    }

    for modification in synthesize(document_text, &normalized_doc, &validation.accepted, context) {
        let modification = expand_placeholder(document_text, modification);
        if seen.insert(batch_key(&modification)) {
            tracing::info!("Synthesized modification: {}", modification);
            validation.accepted.push(modification);
        }
    }

    tracing::info!(
        "Validated batch: {} accepted, {} dropped",
        validation.accepted.len(),
        validation.rejected.len()
    );
    validation
}

fn reject(validation: &mut Validation, modification: Modification, reason: SkipReason) {
    tracing::info!("Dropping modification {}: {}", modification, reason);
    validation.rejected.push((modification, reason));
}

fn batch_key(modification: &Modification) -> (ModificationKind, String, String) {
    (
        modification.kind,
        normalize_whitespace(modification.target()),
        normalize_whitespace(modification.replacement()),
    )
}

fn check(
    text: &str,
    normalized_doc: &str,
    mut modification: Modification,
) -> Result<Modification, (Modification, SkipReason)> {
    if modification.needs_target() && is_generic_term(modification.target()) {
        match term_context(text, modification.target().trim()) {
            TermContext::Safe => {}
            TermContext::Label { located, label } => {
                if modification.kind == ModificationKind::Replace {
                    modification = relabel(modification, located, label);
                }
            }
            TermContext::Unsafe(context) => {
                return Err((modification, SkipReason::UnsafeContext(context)));
            }
        }
    }

    if modification.kind == ModificationKind::Replace
        && contains_date(modification.replacement())
        && !is_fillable(modification.target())
    {
        return Err((modification, SkipReason::UnsafeContext(UnsafeContext::DateOnProse)));
    }

    if is_satisfied(text, normalized_doc, &modification) {
        return Err((modification, SkipReason::DuplicateSatisfied));
    }

    Ok(modification)
}

/// Short capitalised words with no digits or punctuation, like "Company"
fn is_generic_term(target: &str) -> bool {
    let target = target.trim();
    !target.is_empty()
        && target.len() <= GENERIC_TERM_MAX_LEN
        && target.split_whitespace().count() <= GENERIC_TERM_MAX_WORDS
        && target.chars().next().map_or(false, char::is_uppercase)
        && !target
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, ':' | '[' | ']' | '_' | '(' | ')'))
}

/// A bare label such as "Title:" or "By:"
fn is_field_label(target: &str) -> bool {
    let target = target.trim();
    target.ends_with(':')
        && target.len() <= FIELD_LABEL_MAX_LEN
        && target.split_whitespace().count() <= GENERIC_TERM_MAX_WORDS
        && !target.contains('_')
}

/// Targets a date may be written into
fn is_fillable(target: &str) -> bool {
    target.contains("___")
        || bracket_placeholder_pattern().is_match(target)
        || labelled_pattern().is_match(target)
        || contains_date(target)
}

pub fn contains_date(text: &str) -> bool {
    date_pattern().is_match(text)
}

/// Extend a bare label target over the blank-fill that follows it in the document
fn expand_placeholder(text: &str, mut modification: Modification) -> Modification {
    if !modification.needs_target() || !is_field_label(modification.target()) {
        return modification;
    }

    let label = modification.target().trim().to_string();
    let pattern = format!(r"{}[ \t]*_{{3,}}(?:[ \t]*_)*", regex_lite::escape(&label));
    let Ok(regex) = Regex::new(&pattern) else {
        return modification;
    };
    if let Some(found) = regex.find(text) {
        tracing::debug!("Expanded placeholder '{}' to '{}'", label, found.as_str());
        modification.target_text = Some(found.as_str().to_string());
    }
    modification
}

#[derive(Debug, PartialEq, Eq)]
enum TermContext {
    Safe,
    /// The term fills a "Label:" field; `located` is the label and term as written
    Label { located: String, label: String },
    Unsafe(UnsafeContext),
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '\u{2018}' | '\u{2019}')
}

fn term_context(text: &str, term: &str) -> TermContext {
    let mut any_occurrence = false;
    let mut any_safe = false;
    let mut any_defining = false;

    for (start, _) in text.match_indices(term) {
        let end = start + term.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.map_or(false, char::is_alphanumeric) || after.map_or(false, char::is_alphanumeric) {
            continue;
        }
        any_occurrence = true;

        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
        let prefix = &text[line_start..start];

        if label_prefix_pattern().is_match(prefix) {
            let indent = prefix.len() - prefix.trim_start().len();
            return TermContext::Label {
                located: text[line_start + indent..end].to_string(),
                label: prefix.trim().to_string(),
            };
        }

        let defining = before.map_or(false, is_quote) || after.map_or(false, is_quote);
        let prose = text[line_start..line_end].split_whitespace().count() > PROSE_WORDS;
        if defining {
            any_defining = true;
        } else if !prose {
            any_safe = true;
        }
    }

    if !any_occurrence || any_safe {
        TermContext::Safe
    } else if any_defining {
        TermContext::Unsafe(UnsafeContext::DefiningOccurrence)
    } else {
        TermContext::Unsafe(UnsafeContext::EmbeddedInProse)
    }
}

/// Point a bare term at its labelled occurrence, keeping the label in the replacement
fn relabel(mut modification: Modification, located: String, label: String) -> Modification {
    let replacement = modification.replacement().to_string();
    if !replacement.trim_start().starts_with(&label) {
        modification.replacement_text = Some(format!("{} {}", label, replacement.trim_start()));
    }
    tracing::debug!("Relabelled target '{}' to '{}'", modification.target(), located);
    modification.target_text = Some(located);
    modification
}

/// The document already reads the way the modification would leave it.
/// A replace whose target the locator can still reach is never satisfied,
/// unless the replacement itself contains the target.
fn is_satisfied(text: &str, normalized_doc: &str, modification: &Modification) -> bool {
    let replacement = normalize_whitespace(modification.replacement());
    if replacement.is_empty() {
        return false;
    }

    match modification.kind {
        ModificationKind::Replace => {
            let target = normalize_whitespace(modification.target());
            normalized_doc.contains(&replacement)
                && (target.is_empty()
                    || replacement.contains(&target)
                    || !locator::text_contains(text, modification.target()))
        }
        ModificationKind::Insert | ModificationKind::ClauseAdd => normalized_doc.contains(&replacement),
        ModificationKind::Delete => false,
    }
}

/// A signature-block field that can be filled from firm details
struct FieldRule {
    name: &'static str,
    /// Targets starting with this text address the field
    label: &'static str,
    pattern: &'static str,
    value: fn(&FirmDetails) -> Option<&str>,
    render: fn(&str, &str) -> String,
}

const FIELD_RULES: [FieldRule; 8] = [
    FieldRule {
        name: "salutation",
        label: "Dear",
        pattern: r"Dear[ \t]+(?:NAME|_{3,}|\[[A-Za-z_ ]+\]|Recipient|Sir or Madam)[ \t]*[,:]",
        value: FirmDetails::recipient,
        render: |found, value| {
            let punctuation = if found.ends_with(',') { ',' } else { ':' };
            format!("Dear {}{}", value, punctuation)
        },
    },
    FieldRule {
        name: "firm",
        label: "For:",
        pattern: r"For:[ \t]*(?:_{3,}|Company(?:[ \t]*\([^)\n]*\))?|\[[A-Z_ ]+\])",
        value: FirmDetails::firm_name,
        render: |_, value| format!("For: {}", value),
    },
    FieldRule {
        name: "signer",
        label: "By:",
        pattern: r"(?m)^[ \t]*By:[ \t]*(?:_{3,}[ \t]*)?$",
        value: FirmDetails::signer_name,
        render: |_, value| format!("By: {}", value),
    },
    FieldRule {
        name: "title",
        label: "Title:",
        pattern: r"(?m)^[ \t]*Title:[ \t]*(?:_{3,}[ \t]*)?$",
        value: FirmDetails::title,
        render: |_, value| format!("Title: {}", value),
    },
    FieldRule {
        name: "firm name placeholder",
        label: "[FIRM_NAME]",
        pattern: r"\[FIRM_NAME\]",
        value: FirmDetails::firm_name,
        render: |_, value| value.to_string(),
    },
    FieldRule {
        name: "firm address placeholder",
        label: "[FIRM_ADDRESS]",
        pattern: r"\[FIRM_ADDRESS\]",
        value: FirmDetails::address,
        render: |_, value| value.to_string(),
    },
    FieldRule {
        name: "signer name placeholder",
        label: "[SIGNER_NAME]",
        pattern: r"\[SIGNER_NAME\]",
        value: FirmDetails::signer_name,
        render: |_, value| value.to_string(),
    },
    FieldRule {
        name: "signer title placeholder",
        label: "[SIGNER_TITLE]",
        pattern: r"\[SIGNER_TITLE\]",
        value: FirmDetails::title,
        render: |_, value| value.to_string(),
    },
];

impl FieldRule {
    fn is_addressed_by(&self, modification: &Modification) -> bool {
        let target = modification.target().trim_start();
        if self.label.starts_with('[') {
            target.contains(self.label)
        } else {
            target.starts_with(self.label)
        }
    }
}

/// Fill known signature-block fields the planner left alone
fn synthesize(
    text: &str,
    normalized_doc: &str,
    accepted: &[Modification],
    context: &FirmDetails,
) -> Vec<Modification> {
    let mut synthesized: Vec<Modification> = Vec::new();
    if context.is_empty() {
        return synthesized;
    }

    for rule in &FIELD_RULES {
        let Some(value) = (rule.value)(context) else {
            continue;
        };
        if accepted
            .iter()
            .chain(synthesized.iter())
            .any(|m| rule.is_addressed_by(m))
        {
            tracing::debug!("Field '{}' already addressed by the batch", rule.name);
            continue;
        }
        if normalized_doc.contains(&normalize_whitespace(value)) {
            tracing::debug!("Field '{}' already filled with '{}'", rule.name, value);
            continue;
        }
        let Ok(regex) = Regex::new(rule.pattern) else {
            continue;
        };
        let Some(found) = regex.find(text) else {
            continue;
        };

        let target = found.as_str().trim();
        synthesized.push(
            Modification::replace(target, (rule.render)(target, value))
                .with_section("signature")
                .with_rationale(format!("Fill {} from firm details", rule.name))
                .with_location_hint("Signature block"),
        );
    }

    synthesized
}
