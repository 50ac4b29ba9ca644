//! Signature finalizer: places a signature image at the signing line

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::applier::{self, RevisionClock};
use super::locator;
use crate::core::document::{ChangeKind, Document, InlineImage, Paragraph, Run, Segment};

const SIGNED_LABEL: &str = "Signed:";
const SIGNATURE_PLACEHOLDER: &str = "[SIGNATURE]";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Signature image to embed
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureImage {
    pub data: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
    pub width_emu: u64,
    pub height_emu: u64,
}

impl SignatureImage {
    /// Load an image file, scaling it to `width_emu` and keeping its aspect ratio
    pub fn from_file(path: &Path, width_emu: u64) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read signature image: {}", path.display()))?;
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let content_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            other => anyhow::bail!("Unsupported signature image type: .{}", other),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("signature.{}", extension));

        Ok(Self::from_bytes(data, file_name, content_type, width_emu))
    }

    pub fn from_bytes(data: Vec<u8>, file_name: impl Into<String>, content_type: &str, width_emu: u64) -> Self {
        // Unknown dimensions fall back to a 2:1 box
        let height_emu = match png_dimensions(&data) {
            Some((width, height)) if width > 0 => width_emu * u64::from(height) / u64::from(width),
            _ => width_emu / 2,
        };
        Self {
            data,
            file_name: file_name.into(),
            content_type: content_type.to_string(),
            width_emu,
            height_emu,
        }
    }
}

/// Pixel size from a PNG header
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || !data.starts_with(PNG_MAGIC) || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

/// Where the signature ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "anchor", content = "paragraph", rename_all = "snake_case")]
pub enum SignaturePlacement {
    /// After the blank-fill on a signature line
    AfterBlankFill(usize),
    /// After a "Signed:" label
    AfterLabel(usize),
    /// In place of a `[SIGNATURE]` placeholder
    ReplacedPlaceholder(usize),
    /// On a new paragraph at the end of the document
    Appended(usize),
}

impl fmt::Display for SignaturePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AfterBlankFill(i) => write!(f, "after blank fill in paragraph {}", i),
            Self::AfterLabel(i) => write!(f, "after signature label in paragraph {}", i),
            Self::ReplacedPlaceholder(i) => write!(f, "replacing placeholder in paragraph {}", i),
            Self::Appended(i) => write!(f, "appended as paragraph {}", i),
        }
    }
}

/// Embed `image` at the best signature anchor in the document
pub fn place_signature(
    document: &mut Document,
    image: &SignatureImage,
    labels: &[String],
    clock: &mut RevisionClock,
) -> SignaturePlacement {
    let media_id = document.add_media(&image.file_name, &image.content_type, image.data.clone());
    let inline = InlineImage {
        media_id,
        width_emu: image.width_emu,
        height_emu: image.height_emu,
        description: "Signature".to_string(),
    };

    let placement = place_inline(document, inline, labels, clock);
    tracing::info!("Placed signature {}", placement);
    placement
}

fn place_inline(
    document: &mut Document,
    inline: InlineImage,
    labels: &[String],
    clock: &mut RevisionClock,
) -> SignaturePlacement {
    let texts: Vec<String> = document.paragraphs().iter().map(|p| p.text()).collect();

    // Signature line with blanks
    let blank_line = texts.iter().position(|text| {
        let text = text.trim_start();
        labels.iter().any(|label| text.starts_with(label.as_str())) && text.contains("___")
    });
    if let Some(index) = blank_line {
        if let Some(paragraph) = document.paragraph_mut(index) {
            if insert_after_last(paragraph, |text| text.rfind('_').map(|i| i + 1), &inline) {
                return SignaturePlacement::AfterBlankFill(index);
            }
        }
    }

    // "Signed:" label
    if let Some(index) = texts.iter().position(|text| text.contains(SIGNED_LABEL)) {
        if let Some(paragraph) = document.paragraph_mut(index) {
            let after_label = |text: &str| text.find(SIGNED_LABEL).map(|i| i + SIGNED_LABEL.len());
            if !insert_after_last(paragraph, after_label, &inline) {
                paragraph.segments.push(Segment::Image(inline));
            }
            return SignaturePlacement::AfterLabel(index);
        }
    }

    // "[SIGNATURE]" placeholder
    if let Some(found) = locator::locate(document, SIGNATURE_PLACEHOLDER) {
        let index = found.paragraph_index;
        let deletion_id = clock.peek_id();
        if let Some(paragraph) = document.paragraph_mut(index) {
            if applier::apply_deletion(paragraph, &found, clock).is_ok() {
                let position = paragraph
                    .segments
                    .iter()
                    .rposition(|segment| {
                        matches!(segment, Segment::Change(c) if c.kind == ChangeKind::Deletion && c.id >= deletion_id)
                    })
                    .map_or(paragraph.segments.len(), |i| i + 1);
                paragraph.segments.insert(position, Segment::Image(inline));
                return SignaturePlacement::ReplacedPlaceholder(index);
            }
        }
    }

    let paragraph = Paragraph {
        properties: None,
        segments: vec![Segment::Run(Run::new(format!("{} ", SIGNED_LABEL))), Segment::Image(inline)],
    };
    SignaturePlacement::Appended(document.push_paragraph(paragraph))
}

/// Insert the image after the offset `split` picks in the last run it accepts.
/// The run is cut in two when the offset falls inside it.
fn insert_after_last(
    paragraph: &mut Paragraph,
    split: impl Fn(&str) -> Option<usize>,
    inline: &InlineImage,
) -> bool {
    let found = paragraph
        .segments
        .iter()
        .enumerate()
        .rev()
        .find_map(|(index, segment)| match segment {
            Segment::Run(run) => split(&run.text).map(|offset| (index, offset)),
            _ => None,
        });
    let Some((index, offset)) = found else {
        return false;
    };

    let Segment::Run(run) = &paragraph.segments[index] else {
        return false;
    };
    let mut replacement = vec![Segment::Run(Run::with_format(&run.text[..offset], run.format.clone()))];
    replacement.push(Segment::Image(inline.clone()));
    if offset < run.text.len() {
        replacement.push(Segment::Run(Run::with_format(&run.text[offset..], run.format.clone())));
    }
    paragraph.splice(index..index + 1, replacement);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;

    fn image() -> SignatureImage {
        SignatureImage::from_bytes(vec![1, 2, 3], "sig.png", "image/png", 1000)
    }

    fn labels() -> Vec<String> {
        EngineConfig::default().signature_labels
    }

    fn doc(paragraphs: &[&str]) -> Document {
        Document::from_paragraphs(paragraphs.iter().map(|t| Paragraph::from_text(*t)).collect())
    }

    fn segment_kinds(paragraph: &Paragraph) -> Vec<&'static str> {
        paragraph
            .segments
            .iter()
            .map(|s| match s {
                Segment::Run(_) => "run",
                Segment::Change(_) => "change",
                Segment::Image(_) => "image",
                Segment::Raw { .. } => "raw",
            })
            .collect()
    }

    #[test]
    fn test_after_blank_fill() {
        let mut d = doc(&["Agreement", "By: ________ (authorised)"]);
        let placement = place_signature(&mut d, &image(), &labels(), &mut RevisionClock::new("t", 0));
        assert_eq!(placement, SignaturePlacement::AfterBlankFill(1));

        let p = d.paragraphs()[1];
        assert_eq!(segment_kinds(p), vec!["run", "image", "run"]);
        assert_eq!(p.text(), "By: ________ (authorised)");
        assert_eq!(d.media.len(), 1);
    }

    #[test]
    fn test_after_signed_label() {
        let mut d = doc(&["Signed: on behalf of the Company"]);
        let placement = place_signature(&mut d, &image(), &labels(), &mut RevisionClock::new("t", 0));
        assert_eq!(placement, SignaturePlacement::AfterLabel(0));
        match &d.paragraphs()[0].segments[0] {
            Segment::Run(run) => assert_eq!(run.text, "Signed:"),
            other => panic!("unexpected segment: {:?}", other),
        }
    }

    #[test]
    fn test_placeholder_is_deleted() {
        let mut d = doc(&["Signature: [SIGNATURE]"]);
        let placement = place_signature(&mut d, &image(), &labels(), &mut RevisionClock::new("t", 0));
        assert_eq!(placement, SignaturePlacement::ReplacedPlaceholder(0));

        let p = d.paragraphs()[0];
        assert_eq!(p.deleted_text(), "[SIGNATURE]");
        assert_eq!(segment_kinds(p), vec!["run", "change", "image"]);
    }

    #[test]
    fn test_appended_when_no_anchor() {
        let mut d = doc(&["Body only."]);
        let placement = place_signature(&mut d, &image(), &labels(), &mut RevisionClock::new("t", 0));
        assert_eq!(placement, SignaturePlacement::Appended(1));
        assert_eq!(d.paragraphs()[1].text(), "Signed: ");
    }

    #[test]
    fn test_png_aspect_ratio() {
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(&[0, 0, 0, 13]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&200u32.to_be_bytes());
        data.extend_from_slice(&100u32.to_be_bytes());

        let image = SignatureImage::from_bytes(data, "s.png", "image/png", 1_097_280);
        assert_eq!(image.height_emu, 548_640);

        let unknown = SignatureImage::from_bytes(vec![0xff, 0xd8], "s.jpg", "image/jpeg", 1000);
        assert_eq!(unknown.height_emu, 500);
    }
}
