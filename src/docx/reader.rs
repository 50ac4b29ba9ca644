//! Reading `word/document.xml` into the document model

use chrono::{DateTime, Utc};

use super::xml::{self, Element, Node};
use crate::core::document::{
    Block, ChangeKind, ChangeRecord, Document, Paragraph, Run, RunFormat, Segment, Table, TableCell, TableRow,
};
use crate::core::error::DocumentError;

/// Parse the main document part
pub fn read_body(document_xml: &str) -> Result<Document, DocumentError> {
    let nodes = xml::parse(document_xml)?;
    let body = xml::find(&nodes, "w:body").ok_or_else(|| DocumentError::MissingPart("w:body".to_string()))?;

    let document = Document {
        blocks: read_blocks(&body.children),
        media: Vec::new(),
    };
    tracing::debug!("Read {} body blocks", document.blocks.len());
    Ok(document)
}

fn read_blocks(nodes: &[Node]) -> Vec<Block> {
    nodes
        .iter()
        .filter_map(|node| match node {
            Node::Element(el) => Some(match el.name.as_str() {
                "w:p" => Block::Paragraph(read_paragraph(el)),
                "w:tbl" => Block::Table(read_table(el)),
                _ => Block::Raw { xml: el.to_xml() },
            }),
            Node::Text(text) if text.trim().is_empty() => None,
            Node::Text(text) | Node::Raw(text) => Some(Block::Raw { xml: text.clone() }),
        })
        .collect()
}

/// Markup of every child element not called `keep`, concatenated
fn other_children(el: &Element, keep: &str) -> Option<String> {
    let markup: String = el
        .elements()
        .filter(|child| child.name != keep)
        .map(Element::to_xml)
        .collect();
    (!markup.is_empty()).then_some(markup)
}

fn read_table(el: &Element) -> Table {
    Table {
        properties: other_children(el, "w:tr"),
        rows: el
            .elements()
            .filter(|child| child.name == "w:tr")
            .map(|row| TableRow {
                properties: other_children(row, "w:tc"),
                cells: row
                    .elements()
                    .filter(|child| child.name == "w:tc")
                    .map(read_cell)
                    .collect(),
            })
            .collect(),
    }
}

fn read_cell(el: &Element) -> TableCell {
    let mut properties = None;
    let mut content = Vec::new();
    for node in &el.children {
        match node {
            Node::Element(child) if child.name == "w:tcPr" => properties = Some(child.to_xml()),
            other => content.push(other.clone()),
        }
    }
    TableCell {
        properties,
        blocks: read_blocks(&content),
    }
}

fn read_paragraph(el: &Element) -> Paragraph {
    let mut paragraph = Paragraph::default();
    for child in el.elements() {
        if child.name == "w:pPr" {
            paragraph.properties = Some(child.to_xml());
        } else {
            read_segment(child, &mut paragraph.segments);
        }
    }
    paragraph
}

fn read_segment(el: &Element, segments: &mut Vec<Segment>) {
    match el.name.as_str() {
        "w:r" => segments.push(read_run(el)),
        "w:ins" | "w:del" => segments.push(read_change(el)),
        // Spell-check markers carry no content
        "w:proofErr" => {}
        // Link and smart-tag runs are paragraph text; the wrapper tags stay as raw markup
        "w:hyperlink" | "w:smartTag" if !el.self_closing => {
            segments.push(Segment::Raw {
                xml: el.start_tag.clone(),
            });
            for child in el.elements() {
                read_segment(child, segments);
            }
            segments.push(Segment::Raw {
                xml: format!("</{}>", el.name),
            });
        }
        "w:sdt" => read_content_control(el, segments),
        _ => segments.push(Segment::Raw { xml: el.to_xml() }),
    }
}

/// Inline content control: properties before and after `w:sdtContent` stay raw
fn read_content_control(el: &Element, segments: &mut Vec<Segment>) {
    let content = el.children.iter().enumerate().find_map(|(position, node)| match node {
        Node::Element(child) if child.name == "w:sdtContent" && !child.self_closing => Some((position, child)),
        _ => None,
    });
    let Some((position, content)) = content else {
        segments.push(Segment::Raw { xml: el.to_xml() });
        return;
    };

    segments.push(Segment::Raw {
        xml: format!(
            "{}{}{}",
            el.start_tag,
            xml::to_xml(&el.children[..position]),
            content.start_tag
        ),
    });
    for child in content.elements() {
        read_segment(child, segments);
    }
    segments.push(Segment::Raw {
        xml: format!(
            "</w:sdtContent>{}</{}>",
            xml::to_xml(&el.children[position + 1..]),
            el.name
        ),
    });
}

/// Text of a run, or `None` when it holds anything besides text, tabs, and breaks
fn run_text(run: &Element) -> Option<(String, RunFormat)> {
    let mut text = String::new();
    let mut format = RunFormat::default();
    for child in run.elements() {
        match child.name.as_str() {
            "w:rPr" => format = read_format(child),
            "w:t" | "w:delText" => text.push_str(&child.text()),
            "w:tab" => text.push('\t'),
            "w:br" | "w:cr" if !child.has_attributes() => text.push('\n'),
            "w:lastRenderedPageBreak" => {}
            _ => return None,
        }
    }
    Some((text, format))
}

fn read_run(el: &Element) -> Segment {
    match run_text(el) {
        Some((text, format)) => Segment::Run(Run { text, format }),
        None => Segment::Raw { xml: el.to_xml() },
    }
}

fn read_change(el: &Element) -> Segment {
    let kind = if el.name == "w:ins" {
        ChangeKind::Insertion
    } else {
        ChangeKind::Deletion
    };

    let mut text = String::new();
    let mut formatting = None;
    for child in el.elements() {
        let parsed = (child.name == "w:r").then(|| run_text(child)).flatten();
        let Some((piece, piece_format)) = parsed else {
            return Segment::Raw { xml: el.to_xml() };
        };
        text.push_str(&piece);
        formatting.get_or_insert(piece_format);
    }

    let timestamp = el
        .attr("w:date")
        .and_then(|date| DateTime::parse_from_rfc3339(&date).ok())
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or_default();

    Segment::Change(ChangeRecord {
        id: el.attr("w:id").and_then(|id| id.parse().ok()).unwrap_or(0),
        author: el.attr("w:author").unwrap_or_default(),
        timestamp,
        kind,
        text,
        formatting: formatting.unwrap_or_default(),
    })
}

/// Formatting flags from a `w:rPr` element, keeping the markup
pub(super) fn read_format(rpr: &Element) -> RunFormat {
    let flag = |name: &str| {
        rpr.child(name).map_or(false, |el| {
            !matches!(el.attr("w:val").as_deref(), Some("0" | "false" | "none"))
        })
    };

    RunFormat {
        bold: flag("w:b"),
        italic: flag("w:i"),
        underline: flag("w:u"),
        strike: flag("w:strike"),
        color: rpr
            .child("w:color")
            .and_then(|el| el.attr("w:val"))
            .filter(|val| val != "auto"),
        raw: Some(rpr.to_xml()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(content: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            content
        )
    }

    #[test]
    fn test_runs_and_formatting() {
        let doc = read_body(&body(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/><w:color w:val="00FF00"/></w:rPr><w:t>For:</w:t></w:r><w:proofErr w:type="spellStart"/><w:r><w:tab/><w:t xml:space="preserve">A &amp; B </w:t></w:r></w:p>"#,
        ))
        .unwrap();

        let p = doc.paragraphs()[0];
        assert_eq!(p.text(), "For:\tA & B ");
        assert_eq!(p.properties.as_deref(), Some(r#"<w:pPr><w:jc w:val="center"/></w:pPr>"#));
        assert_eq!(p.run_windows().len(), 1);
        match &p.segments[0] {
            Segment::Run(run) => {
                assert!(run.format.bold);
                assert!(!run.format.italic);
                assert_eq!(run.format.color.as_deref(), Some("00FF00"));
            }
            other => panic!("unexpected segment: {:?}", other),
        }
    }

    #[test]
    fn test_bold_off_value() {
        let doc = read_body(&body(r#"<w:p><w:r><w:rPr><w:b w:val="0"/></w:rPr><w:t>x</w:t></w:r></w:p>"#)).unwrap();
        match &doc.paragraphs()[0].segments[0] {
            Segment::Run(run) => assert!(!run.format.bold),
            other => panic!("unexpected segment: {:?}", other),
        }
    }

    #[test]
    fn test_tables_and_raw_blocks() {
        let doc = read_body(&body(
            r#"<w:p><w:r><w:t>Intro</w:t></w:r></w:p><w:tbl><w:tblPr/><w:tblGrid><w:gridCol/></w:tblGrid><w:tr><w:tc><w:tcPr/><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:sectPr/>"#,
        ))
        .unwrap();

        assert_eq!(doc.plain_text(), "Intro\nCell");
        match &doc.blocks[1] {
            Block::Table(table) => {
                assert_eq!(table.properties.as_deref(), Some("<w:tblPr/><w:tblGrid><w:gridCol/></w:tblGrid>"));
                assert_eq!(table.rows[0].cells[0].properties.as_deref(), Some("<w:tcPr/>"));
            }
            other => panic!("unexpected block: {:?}", other),
        }
        assert_eq!(doc.blocks[2], Block::Raw { xml: "<w:sectPr/>".into() });
    }

    #[test]
    fn test_existing_revisions() {
        let doc = read_body(&body(
            r#"<w:p><w:r><w:t>a</w:t></w:r><w:del w:id="7" w:author="Ann" w:date="2024-01-02T03:04:05Z"><w:r><w:delText>old</w:delText></w:r></w:del><w:ins w:id="8" w:author="Ann"><w:r><w:t>new</w:t></w:r></w:ins></w:p>"#,
        ))
        .unwrap();

        let p = doc.paragraphs()[0];
        assert_eq!(p.text(), "anew");
        assert_eq!(p.deleted_text(), "old");
        assert_eq!(doc.max_change_id(), 8);
        let deletion = p.changes().next().unwrap();
        assert_eq!(deletion.author, "Ann");
        assert_eq!(deletion.timestamp.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_unknown_run_content_is_raw() {
        let doc = read_body(&body(
            r#"<w:p><w:r><w:drawing/></w:r><w:r><w:br w:type="page"/></w:r><w:bookmarkStart w:id="0"/></w:p>"#,
        ))
        .unwrap();
        let p = doc.paragraphs()[0];
        assert!(p.segments.iter().all(|s| matches!(s, Segment::Raw { .. })));
        assert!(p.run_windows().is_empty());
    }

    #[test]
    fn test_hyperlink_text_is_paragraph_text() {
        let doc = read_body(&body(
            r#"<w:p><w:r><w:t xml:space="preserve">See </w:t></w:r><w:hyperlink r:id="rId9" w:history="1"><w:r><w:rPr><w:rStyle w:val="Hyperlink"/></w:rPr><w:t>the portal</w:t></w:r></w:hyperlink><w:r><w:t>.</w:t></w:r></w:p>"#,
        ))
        .unwrap();

        let p = doc.paragraphs()[0];
        assert_eq!(p.text(), "See the portal.");
        assert_eq!(p.run_windows().len(), 1);
        assert_eq!(
            p.segments[1],
            Segment::Raw {
                xml: r#"<w:hyperlink r:id="rId9" w:history="1">"#.into()
            }
        );
        assert_eq!(p.segments[3], Segment::Raw { xml: "</w:hyperlink>".into() });
    }

    #[test]
    fn test_content_control_runs() {
        let doc = read_body(&body(
            r#"<w:p><w:sdt><w:sdtPr><w:alias w:val="Party"/></w:sdtPr><w:sdtContent><w:r><w:t>ABC Corp</w:t></w:r></w:sdtContent></w:sdt></w:p>"#,
        ))
        .unwrap();

        let p = doc.paragraphs()[0];
        assert_eq!(p.text(), "ABC Corp");
        assert_eq!(
            p.segments[0],
            Segment::Raw {
                xml: r#"<w:sdt><w:sdtPr><w:alias w:val="Party"/></w:sdtPr><w:sdtContent>"#.into()
            }
        );
        assert_eq!(
            p.segments[2],
            Segment::Raw {
                xml: "</w:sdtContent></w:sdt>".into()
            }
        );
    }

    #[test]
    fn test_missing_body() {
        assert!(matches!(
            read_body("<w:document></w:document>"),
            Err(DocumentError::MissingPart(_))
        ));
    }
}
