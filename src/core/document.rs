//! In-memory document model
//!
//! A document is an ordered list of blocks. Paragraphs own a list of
//! segments: plain runs, tracked changes, inline images, and opaque markup
//! carried over from the source file. Paragraphs are addressed by their
//! depth-first position in the document, table cells included.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colour used for redline marks
pub const REDLINE_COLOR: &str = "FF0000";

/// A word-processing document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Top-level blocks in reading order
    pub blocks: Vec<Block>,
    /// Binary parts referenced by inline images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaPart>,
}

/// A top-level or cell-level block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    /// Markup the model does not interpret (section properties, content controls)
    Raw { xml: String },
}

/// A table: rows of cells, each cell owning its own blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    pub blocks: Vec<Block>,
}

/// A paragraph: an ordered list of segments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Paragraph properties markup, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    pub segments: Vec<Segment>,
}

/// One piece of paragraph content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Run(Run),
    Change(ChangeRecord),
    Image(InlineImage),
    Raw { xml: String },
}

/// Atomic unit of text and formatting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub text: String,
    #[serde(default)]
    pub format: RunFormat,
}

/// Character formatting carried by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFormat {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strike: bool,
    /// Hex RGB colour, e.g. `FF0000`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Run properties markup from the source file, kept verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Kind of tracked change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insertion,
    Deletion,
}

/// A tracked change owned by the paragraph that contains it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: u32,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ChangeKind,
    pub text: String,
    #[serde(default)]
    pub formatting: RunFormat,
}

/// An image placed inline in a paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    /// Id of the `MediaPart` holding the image bytes
    pub media_id: String,
    pub width_emu: u64,
    pub height_emu: u64,
    #[serde(default)]
    pub description: String,
}

/// Binary payload referenced from the document body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPart {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A maximal stretch of plain runs inside a paragraph.
///
/// Opaque markup between two runs (bookmarks, comment ranges, field
/// wrappers) contributes no text and does not end the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWindow {
    /// Segment indices covered by this window, first and last are runs
    pub segments: Range<usize>,
    /// Concatenated text of the covered runs
    pub text: String,
}

/// Where to place a paragraph relative to an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

impl RunFormat {
    /// Formatting that makes a change visible without revision support:
    /// struck-through red for deletions, underlined red for insertions
    pub fn redline(&self, kind: ChangeKind) -> RunFormat {
        let mut format = self.clone();
        match kind {
            ChangeKind::Deletion => format.strike = true,
            ChangeKind::Insertion => format.underline = true,
        }
        format.color = Some(REDLINE_COLOR.to_string());
        format
    }
}

impl ChangeRecord {
    /// Formatting used when the change is rendered as a plain styled run
    pub fn display_format(&self) -> RunFormat {
        self.formatting.redline(self.kind)
    }
}

impl Run {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: RunFormat::default(),
        }
    }

    pub fn with_format(text: impl Into<String>, format: RunFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }
}

impl Paragraph {
    /// Create a paragraph holding a single unformatted run
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_runs(vec![Run::new(text)])
    }

    /// Create a paragraph from runs
    pub fn from_runs(runs: Vec<Run>) -> Self {
        Self {
            properties: None,
            segments: runs.into_iter().map(Segment::Run).collect(),
        }
    }

    /// Current paragraph text: plain runs plus inserted text, deleted text excluded
    pub fn text(&self) -> String {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Run(run) => text.push_str(&run.text),
                Segment::Change(change) if change.kind == ChangeKind::Insertion => {
                    text.push_str(&change.text)
                }
                _ => {}
            }
        }
        text
    }

    /// Iterate over the tracked changes in this paragraph
    pub fn changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Change(change) => Some(change),
            _ => None,
        })
    }

    /// Concatenated text of all deletions
    pub fn deleted_text(&self) -> String {
        self.changes()
            .filter(|c| c.kind == ChangeKind::Deletion)
            .map(|c| c.text.as_str())
            .collect()
    }

    /// Concatenated text of all insertions
    pub fn inserted_text(&self) -> String {
        self.changes()
            .filter(|c| c.kind == ChangeKind::Insertion)
            .map(|c| c.text.as_str())
            .collect()
    }

    /// Split the segments into windows of plain runs.
    ///
    /// Text that is already part of a tracked change never belongs to a
    /// window, so a match can never straddle an earlier edit. Images end a
    /// window too; raw markup is skipped over.
    pub fn run_windows(&self) -> Vec<RunWindow> {
        let mut windows = Vec::new();
        let mut current: Option<RunWindow> = None;

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Run(run) => {
                    let window = current.get_or_insert_with(|| RunWindow {
                        segments: index..index,
                        text: String::new(),
                    });
                    window.segments.end = index + 1;
                    window.text.push_str(&run.text);
                }
                Segment::Raw { .. } => {}
                Segment::Change(_) | Segment::Image(_) => {
                    if let Some(window) = current.take() {
                        windows.push(window);
                    }
                }
            }
        }
        if let Some(window) = current {
            windows.push(window);
        }

        windows
    }

    /// Replace a range of segments with new ones
    pub fn splice(&mut self, range: Range<usize>, replacement: Vec<Segment>) {
        self.segments.splice(range, replacement);
    }

    /// Check whether the paragraph holds any visible content
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|segment| match segment {
            Segment::Run(run) => run.text.is_empty(),
            Segment::Raw { .. } => true,
            _ => false,
        })
    }
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from top-level paragraphs
    pub fn from_paragraphs(paragraphs: Vec<Paragraph>) -> Self {
        Self {
            blocks: paragraphs.into_iter().map(Block::Paragraph).collect(),
            media: Vec::new(),
        }
    }

    /// All paragraphs in document order, descending into table cells
    pub fn paragraphs(&self) -> Vec<&Paragraph> {
        self.iter_paragraphs().collect()
    }

    /// Walk paragraphs in document order without collecting them
    pub fn iter_paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        walk_paragraphs(&self.blocks)
    }

    /// Number of addressable paragraphs
    pub fn paragraph_count(&self) -> usize {
        self.iter_paragraphs().count()
    }

    /// Get a paragraph by its document-order index
    pub fn paragraph_mut(&mut self, index: usize) -> Option<&mut Paragraph> {
        let mut remaining = index;
        find_paragraph_mut(&mut self.blocks, &mut remaining)
    }

    /// Plain text of the whole document, one line per paragraph
    pub fn plain_text(&self) -> String {
        self.iter_paragraphs()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Append a paragraph at the end of the body.
    ///
    /// Trailing section properties stay last, as the file format requires.
    pub fn push_paragraph(&mut self, paragraph: Paragraph) -> usize {
        let position = match self.blocks.last() {
            Some(Block::Raw { xml }) if xml.starts_with("<w:sectPr") => self.blocks.len() - 1,
            _ => self.blocks.len(),
        };
        let index = walk_paragraphs(&self.blocks[..position]).count();
        self.blocks.insert(position, Block::Paragraph(paragraph));
        index
    }

    /// Insert a paragraph next to the paragraph at `index`, inside the same container.
    /// Returns false when `index` does not exist.
    pub fn insert_paragraph(&mut self, index: usize, placement: Placement, paragraph: Paragraph) -> bool {
        let offset = match placement {
            Placement::Before => 0,
            Placement::After => 1,
        };
        let mut remaining = index;
        let mut pending = Some(paragraph);
        insert_relative(&mut self.blocks, &mut remaining, offset, &mut pending)
    }

    /// Highest tracked-change id in use
    pub fn max_change_id(&self) -> u32 {
        self.iter_paragraphs()
            .flat_map(|p| p.changes())
            .map(|c| c.id)
            .max()
            .unwrap_or(0)
    }

    /// Register a media part, returning its id
    pub fn add_media(&mut self, file_name: &str, content_type: &str, data: Vec<u8>) -> String {
        let id = format!("media{}", self.media.len() + 1);
        self.media.push(MediaPart {
            id: id.clone(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            data,
        });
        id
    }
}

fn walk_paragraphs<'a>(blocks: &'a [Block]) -> Box<dyn Iterator<Item = &'a Paragraph> + 'a> {
    Box::new(blocks.iter().flat_map(|block| -> Box<dyn Iterator<Item = &'a Paragraph> + 'a> {
        match block {
            Block::Paragraph(p) => Box::new(std::iter::once(p)),
            Block::Table(table) => Box::new(
                table
                    .rows
                    .iter()
                    .flat_map(|row| row.cells.iter())
                    .flat_map(|cell| walk_paragraphs(&cell.blocks)),
            ),
            Block::Raw { .. } => Box::new(std::iter::empty()),
        }
    }))
}

fn find_paragraph_mut<'a>(blocks: &'a mut [Block], remaining: &mut usize) -> Option<&'a mut Paragraph> {
    for block in blocks.iter_mut() {
        match block {
            Block::Paragraph(p) => {
                if *remaining == 0 {
                    return Some(p);
                }
                *remaining -= 1;
            }
            Block::Table(table) => {
                for row in &mut table.rows {
                    for cell in &mut row.cells {
                        if let Some(p) = find_paragraph_mut(&mut cell.blocks, remaining) {
                            return Some(p);
                        }
                    }
                }
            }
            Block::Raw { .. } => {}
        }
    }
    None
}

fn insert_relative(
    blocks: &mut Vec<Block>,
    remaining: &mut usize,
    offset: usize,
    pending: &mut Option<Paragraph>,
) -> bool {
    let mut i = 0;
    while i < blocks.len() {
        if matches!(blocks[i], Block::Paragraph(_)) {
            if *remaining == 0 {
                if let Some(paragraph) = pending.take() {
                    blocks.insert(i + offset, Block::Paragraph(paragraph));
                }
                return true;
            }
            *remaining -= 1;
        } else if let Block::Table(table) = &mut blocks[i] {
            for row in &mut table.rows {
                for cell in &mut row.cells {
                    if insert_relative(&mut cell.blocks, remaining, offset, pending) {
                        return true;
                    }
                }
            }
        }
        i += 1;
    }
    false
}
