//! Rendering the document model back into `word/document.xml`
//!
//! Only the children of `w:body` are regenerated. Everything outside the body
//! (namespace declarations, the document element itself) is written back as
//! it was read.

use std::collections::HashMap;

use super::reader::read_format;
use super::xml::{self, escape, Node};
use crate::core::config::RedlineMode;
use crate::core::document::{Block, ChangeKind, ChangeRecord, Document, InlineImage, Paragraph, RunFormat, Segment};
use crate::core::error::DocumentError;

/// `w:rPr` children in schema order; unknown elements sort last
const RPR_ORDER: &[&str] = &[
    "w:rStyle",
    "w:rFonts",
    "w:b",
    "w:bCs",
    "w:i",
    "w:iCs",
    "w:caps",
    "w:smallCaps",
    "w:strike",
    "w:dstrike",
    "w:outline",
    "w:shadow",
    "w:emboss",
    "w:imprint",
    "w:noProof",
    "w:snapToGrid",
    "w:vanish",
    "w:webHidden",
    "w:color",
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
];

/// Formatting elements owned by [`RunFormat`] flags
const FLAG_ELEMENTS: &[&str] = &["w:b", "w:i", "w:u", "w:strike", "w:color"];

/// Drawing ids start high to stay clear of ids already in the document
const FIRST_DRAWING_ID: u32 = 1000;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Re-render the body of `original_xml` from `document`.
/// `relationships` maps media ids to relationship ids.
pub fn write_body(
    original_xml: &str,
    document: &Document,
    mode: RedlineMode,
    relationships: &HashMap<String, String>,
) -> Result<String, DocumentError> {
    let mut nodes = xml::parse(original_xml)?;
    let body = xml::find_mut(&mut nodes, "w:body").ok_or_else(|| DocumentError::MissingPart("w:body".to_string()))?;

    let mut renderer = Renderer {
        mode,
        relationships,
        next_drawing_id: FIRST_DRAWING_ID,
        out: String::new(),
    };
    renderer.blocks(&document.blocks);
    body.children = vec![Node::Raw(renderer.out)];

    Ok(xml::to_xml(&nodes))
}

struct Renderer<'a> {
    mode: RedlineMode,
    relationships: &'a HashMap<String, String>,
    next_drawing_id: u32,
    out: String,
}

impl Renderer<'_> {
    fn blocks(&mut self, blocks: &[Block]) {
        for block in blocks {
            match block {
                Block::Paragraph(paragraph) => self.paragraph(paragraph),
                Block::Table(table) => {
                    self.out.push_str("<w:tbl>");
                    self.push_opt(&table.properties);
                    for row in &table.rows {
                        self.out.push_str("<w:tr>");
                        self.push_opt(&row.properties);
                        for cell in &row.cells {
                            self.out.push_str("<w:tc>");
                            self.push_opt(&cell.properties);
                            self.blocks(&cell.blocks);
                            // A cell must end in a paragraph
                            if !matches!(cell.blocks.last(), Some(Block::Paragraph(_))) {
                                self.out.push_str("<w:p/>");
                            }
                            self.out.push_str("</w:tc>");
                        }
                        self.out.push_str("</w:tr>");
                    }
                    self.out.push_str("</w:tbl>");
                }
                Block::Raw { xml } => self.out.push_str(xml),
            }
        }
    }

    fn push_opt(&mut self, markup: &Option<String>) {
        if let Some(markup) = markup {
            self.out.push_str(markup);
        }
    }

    fn paragraph(&mut self, paragraph: &Paragraph) {
        self.out.push_str("<w:p>");
        self.push_opt(&paragraph.properties);
        for segment in &paragraph.segments {
            match segment {
                Segment::Run(run) => self.run(&run.format, &run.text, "w:t"),
                Segment::Change(change) => self.change(change),
                Segment::Image(image) => self.image(image),
                Segment::Raw { xml } => self.out.push_str(xml),
            }
        }
        self.out.push_str("</w:p>");
    }

    fn run(&mut self, format: &RunFormat, text: &str, text_tag: &str) {
        self.out.push_str("<w:r>");
        self.out.push_str(&run_properties(format));
        run_content(&mut self.out, text, text_tag);
        self.out.push_str("</w:r>");
    }

    fn change(&mut self, change: &ChangeRecord) {
        match self.mode {
            RedlineMode::Visual => self.run(&change.display_format(), &change.text, "w:t"),
            RedlineMode::Native => {
                let (tag, text_tag) = match change.kind {
                    ChangeKind::Insertion => ("w:ins", "w:t"),
                    ChangeKind::Deletion => ("w:del", "w:delText"),
                };
                self.out.push_str(&format!(
                    r#"<{} w:id="{}" w:author="{}" w:date="{}">"#,
                    tag,
                    change.id,
                    escape(&change.author),
                    change.timestamp.format(DATE_FORMAT)
                ));
                self.run(&change.formatting, &change.text, text_tag);
                self.out.push_str(&format!("</{}>", tag));
            }
        }
    }

    fn image(&mut self, image: &InlineImage) {
        let Some(rel_id) = self.relationships.get(&image.media_id) else {
            tracing::warn!("No relationship for media {}, image dropped", image.media_id);
            return;
        };
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;

        self.out.push_str(&format!(
            concat!(
                r#"<w:r><w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
                r#"<wp:docPr id="{id}" name="Picture {id}" descr="{descr}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
                r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<pic:nvPicPr><pic:cNvPr id="0" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rel}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#,
            ),
            cx = image.width_emu,
            cy = image.height_emu,
            id = id,
            descr = escape(&image.description),
            rel = escape(rel_id),
        ));
    }
}

/// Text, tabs, and breaks of a run
fn run_content(out: &mut String, text: &str, text_tag: &str) {
    let mut pending = String::new();
    let flush = |out: &mut String, pending: &mut String| {
        if !pending.is_empty() {
            out.push_str(&format!(
                r#"<{tag} xml:space="preserve">{}</{tag}>"#,
                escape(pending),
                tag = text_tag
            ));
            pending.clear();
        }
    };

    for c in text.chars() {
        match c {
            '\t' => {
                flush(out, &mut pending);
                out.push_str("<w:tab/>");
            }
            '\n' => {
                flush(out, &mut pending);
                out.push_str("<w:br/>");
            }
            _ => pending.push(c),
        }
    }
    flush(out, &mut pending);
}

fn same_flags(a: &RunFormat, b: &RunFormat) -> bool {
    a.bold == b.bold && a.italic == b.italic && a.underline == b.underline && a.strike == b.strike && a.color == b.color
}

/// `w:rPr` markup for a format.
///
/// The source markup is reused verbatim when its flags still hold. Otherwise
/// the flag elements are rebuilt and merged with the rest of the source markup.
fn run_properties(format: &RunFormat) -> String {
    let source = format
        .raw
        .as_deref()
        .and_then(|raw| xml::parse(raw).ok())
        .and_then(|nodes| xml::find(&nodes, "w:rPr").cloned());

    let mut children: Vec<(usize, String)> = Vec::new();
    if let Some(rpr) = &source {
        if same_flags(&read_format(rpr), format) {
            return rpr.to_xml();
        }
        children.extend(
            rpr.elements()
                .filter(|el| !FLAG_ELEMENTS.contains(&el.name.as_str()))
                .map(|el| (rank(&el.name), el.to_xml())),
        );
    }

    if format.bold {
        children.push((rank("w:b"), "<w:b/>".to_string()));
    }
    if format.italic {
        children.push((rank("w:i"), "<w:i/>".to_string()));
    }
    if format.strike {
        children.push((rank("w:strike"), "<w:strike/>".to_string()));
    }
    if let Some(color) = &format.color {
        children.push((rank("w:color"), format!(r#"<w:color w:val="{}"/>"#, escape(color))));
    }
    if format.underline {
        children.push((rank("w:u"), r#"<w:u w:val="single"/>"#.to_string()));
    }

    if children.is_empty() {
        return String::new();
    }
    children.sort_by_key(|(rank, _)| *rank);
    let inner: String = children.into_iter().map(|(_, markup)| markup).collect();
    format!("<w:rPr>{}</w:rPr>", inner)
}

fn rank(name: &str) -> usize {
    RPR_ORDER.iter().position(|known| *known == name).unwrap_or(RPR_ORDER.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::Run;
    use crate::docx::reader::read_body;
    use chrono::{TimeZone, Utc};

    const SOURCE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>old</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;

    fn change(kind: ChangeKind, text: &str) -> Segment {
        Segment::Change(ChangeRecord {
            id: 4,
            author: "R & D".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            kind,
            text: text.into(),
            formatting: RunFormat::default(),
        })
    }

    fn redlined() -> Document {
        let paragraph = Paragraph {
            properties: Some(r#"<w:pPr><w:jc w:val="both"/></w:pPr>"#.into()),
            segments: vec![
                Segment::Run(Run::new("Term: ")),
                change(ChangeKind::Deletion, "three"),
                change(ChangeKind::Insertion, "two"),
                Segment::Run(Run::new("\tyears")),
            ],
        };
        let mut doc = Document::from_paragraphs(vec![paragraph]);
        doc.blocks.push(Block::Raw { xml: "<w:sectPr/>".into() });
        doc
    }

    #[test]
    fn test_native_revisions() {
        let xml = write_body(SOURCE, &redlined(), RedlineMode::Native, &HashMap::new()).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0""#));
        assert!(xml.contains(r#"<w:del w:id="4" w:author="R &amp; D" w:date="2025-03-01T12:30:00Z">"#));
        assert!(xml.contains(r#"<w:delText xml:space="preserve">three</w:delText>"#));
        assert!(xml.contains(r#"<w:ins w:id="4""#));
        assert!(xml.contains("<w:tab/>"));
        assert!(xml.ends_with("<w:sectPr/></w:body></w:document>"));

        let reread = read_body(&xml).unwrap();
        let p = reread.paragraphs()[0];
        assert_eq!(p.text(), "Term: two\tyears");
        assert_eq!(p.deleted_text(), "three");
        assert_eq!(p.properties.as_deref(), Some(r#"<w:pPr><w:jc w:val="both"/></w:pPr>"#));
    }

    #[test]
    fn test_visual_redline() {
        let xml = write_body(SOURCE, &redlined(), RedlineMode::Visual, &HashMap::new()).unwrap();
        assert!(!xml.contains("<w:ins"));
        assert!(!xml.contains("<w:del "));
        assert!(xml.contains(r#"<w:rPr><w:strike/><w:color w:val="FF0000"/></w:rPr><w:t xml:space="preserve">three</w:t>"#));
        assert!(xml.contains(r#"<w:rPr><w:color w:val="FF0000"/><w:u w:val="single"/></w:rPr><w:t xml:space="preserve">two</w:t>"#));
    }

    #[test]
    fn test_source_properties_are_kept() {
        let raw = r#"<w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:sz w:val="20"/></w:rPr>"#;
        let format = RunFormat {
            bold: true,
            raw: Some(raw.into()),
            ..Default::default()
        };
        assert_eq!(run_properties(&format), raw);

        let redlined = format.redline(ChangeKind::Deletion);
        assert_eq!(
            run_properties(&redlined),
            r#"<w:rPr><w:rFonts w:ascii="Arial"/><w:b/><w:strike/><w:color w:val="FF0000"/><w:sz w:val="20"/></w:rPr>"#
        );
        assert_eq!(run_properties(&RunFormat::default()), "");
    }

    #[test]
    fn test_image_needs_relationship() {
        let mut doc = Document::from_paragraphs(vec![Paragraph {
            properties: None,
            segments: vec![Segment::Image(InlineImage {
                media_id: "media1".into(),
                width_emu: 100,
                height_emu: 50,
                description: "Signature".into(),
            })],
        }]);
        let missing = write_body(SOURCE, &doc, RedlineMode::Native, &HashMap::new()).unwrap();
        assert!(!missing.contains("<w:drawing>"));

        let rels = HashMap::from([("media1".to_string(), "rId9".to_string())]);
        let xml = write_body(SOURCE, &doc, RedlineMode::Native, &rels).unwrap();
        assert!(xml.contains(r#"r:embed="rId9""#));
        assert!(xml.contains(r#"<wp:extent cx="100" cy="50"/>"#));
        assert!(xml::parse(&xml).is_ok());

        doc.blocks.clear();
        let empty = write_body(SOURCE, &doc, RedlineMode::Native, &rels).unwrap();
        assert!(empty.contains("<w:body></w:body>"));
    }
}
