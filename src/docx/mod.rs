//! WordprocessingML (`.docx`) support
//!
//! Reading turns `word/document.xml` into the document model. Writing
//! re-renders the body, embeds new media, and copies every other part through.

mod package;
mod reader;
mod writer;
pub mod xml;

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;

pub use package::DocxPackage;

use crate::core::config::RedlineMode;
use crate::core::document::{Document, MediaPart};
use crate::core::error::DocumentError;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_RELATIONSHIP: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

fn rel_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"Id="rId(\d+)""#).expect("relationship id pattern is valid"))
}

/// Parse the document body of a package
pub fn read_document(package: &DocxPackage) -> Result<Document, DocumentError> {
    let xml = package.entry_text(DOCUMENT_PART)?;
    reader::read_body(&xml)
}

/// Build a new package holding `document`
pub fn write_document(package: &DocxPackage, document: &Document, mode: RedlineMode) -> Result<DocxPackage, DocumentError> {
    let mut output = package.clone();
    let relationships = embed_media(&mut output, &document.media)?;

    let original = package.entry_text(DOCUMENT_PART)?;
    let body = writer::write_body(&original, document, mode, &relationships)?;
    output.set_entry(DOCUMENT_PART, body.into_bytes());

    Ok(output)
}

/// Add media parts, their relationships, and content types.
/// Returns the relationship id of each media id.
fn embed_media(package: &mut DocxPackage, media: &[MediaPart]) -> Result<HashMap<String, String>, DocumentError> {
    let mut relationships = HashMap::new();
    if media.is_empty() {
        return Ok(relationships);
    }

    let mut rels = package.entry_text(RELS_PART)?;
    let mut content_types = package.entry_text(CONTENT_TYPES_PART)?;
    let mut next_id = rel_id_pattern()
        .captures_iter(&rels)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;

    for part in media {
        let extension = part
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_else(|| "png".to_string());
        let target = format!("media/redliner_{}.{}", part.id, extension);
        let rel_id = format!("rId{}", next_id);
        next_id += 1;

        package.set_entry(&format!("word/{}", target), part.data.clone());
        insert_before(
            &mut rels,
            "</Relationships>",
            &format!(r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#, rel_id, IMAGE_RELATIONSHIP, target),
        )?;

        let default = format!(r#"Extension="{}""#, extension);
        if !content_types.to_lowercase().contains(&default) {
            insert_before(
                &mut content_types,
                "</Types>",
                &format!(
                    r#"<Default Extension="{}" ContentType="{}"/>"#,
                    extension,
                    xml::escape(&part.content_type)
                ),
            )?;
        }

        tracing::debug!("Embedded {} as {} ({})", part.file_name, target, rel_id);
        relationships.insert(part.id.clone(), rel_id);
    }

    package.set_entry(RELS_PART, rels.into_bytes());
    package.set_entry(CONTENT_TYPES_PART, content_types.into_bytes());
    Ok(relationships)
}

fn insert_before(xml: &mut String, closing: &str, markup: &str) -> Result<(), DocumentError> {
    let position = xml
        .rfind(closing)
        .ok_or_else(|| DocumentError::Xml(format!("missing {}", closing)))?;
    xml.insert_str(position, markup);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{Paragraph, Segment};

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:i/></w:rPr><w:t>Hello</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
    const RELS: &str = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="styles" Target="styles.xml"/><Relationship Id="rId7" Type="theme" Target="theme/theme1.xml"/></Relationships>"#;
    const TYPES: &str = r#"<?xml version="1.0"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;

    fn sample_package() -> DocxPackage {
        DocxPackage::new(vec![
            (CONTENT_TYPES_PART.into(), TYPES.as_bytes().to_vec()),
            (RELS_PART.into(), RELS.as_bytes().to_vec()),
            (DOCUMENT_PART.into(), DOCUMENT.as_bytes().to_vec()),
            ("word/styles.xml".into(), b"<w:styles/>".to_vec()),
        ])
    }

    #[test]
    fn test_untouched_document_keeps_formatting() {
        let package = sample_package();
        let doc = read_document(&package).unwrap();
        assert_eq!(doc.plain_text(), "Hello");

        let written = write_document(&package, &doc, RedlineMode::Native).unwrap();
        let xml = written.entry_text(DOCUMENT_PART).unwrap();
        assert!(xml.contains(r#"<w:rPr><w:i/></w:rPr><w:t xml:space="preserve">Hello</w:t>"#));
        assert_eq!(written.entry("word/styles.xml"), Some(&b"<w:styles/>"[..]));
        assert_eq!(written.entry_text(RELS_PART).unwrap(), RELS);
    }

    #[test]
    fn test_edit_inside_hyperlink_keeps_wrapper() {
        use crate::redline::applier::{self, RevisionClock};
        use crate::redline::locator;

        let link = r#"<w:p><w:r><w:t xml:space="preserve">See </w:t></w:r><w:hyperlink r:id="rId9"><w:r><w:t>the portal</w:t></w:r></w:hyperlink></w:p>"#;
        let mut package = sample_package();
        package.set_entry(DOCUMENT_PART, DOCUMENT.replace("<w:sectPr/>", &format!("{}<w:sectPr/>", link)).into_bytes());

        let mut doc = read_document(&package).unwrap();
        let found = locator::locate(&doc, "portal").unwrap();
        assert_eq!(found.paragraph_index, 1);
        let mut clock = RevisionClock::new("Tester", 0);
        let paragraph = doc.paragraph_mut(1).unwrap();
        applier::apply(paragraph, &found, "website", &mut clock).unwrap();

        let written = write_document(&package, &doc, RedlineMode::Native).unwrap();
        let xml = written.entry_text(DOCUMENT_PART).unwrap();
        let open = xml.find(r#"<w:hyperlink r:id="rId9">"#).unwrap();
        let deletion = xml.find("<w:del ").unwrap();
        let close = xml.find("</w:hyperlink>").unwrap();
        assert!(open < deletion && deletion < close);

        let reread = read_document(&written).unwrap();
        assert_eq!(reread.paragraphs()[1].text(), "See the website");
        assert_eq!(reread.paragraphs()[1].deleted_text(), "portal");
    }

    #[test]
    fn test_media_is_embedded() {
        let package = sample_package();
        let mut doc = read_document(&package).unwrap();
        let media_id = doc.add_media("sig.png", "image/png", vec![9, 9]);
        let mut paragraph = Paragraph::from_text("Signed: ");
        paragraph.segments.push(Segment::Image(crate::core::document::InlineImage {
            media_id,
            width_emu: 10,
            height_emu: 5,
            description: "Signature".into(),
        }));
        doc.push_paragraph(paragraph);

        let written = write_document(&package, &doc, RedlineMode::Native).unwrap();
        assert_eq!(written.entry("word/media/redliner_media1.png"), Some(&[9u8, 9][..]));

        let rels = written.entry_text(RELS_PART).unwrap();
        assert!(rels.contains(r#"<Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/redliner_media1.png"/></Relationships>"#));

        let types = written.entry_text(CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"<Default Extension="png" ContentType="image/png"/></Types>"#));

        let xml = written.entry_text(DOCUMENT_PART).unwrap();
        assert!(xml.contains(r#"r:embed="rId8""#));
    }
}
