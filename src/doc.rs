//! Editable document tree consumed by flow-block conversion.
//!
//! This is the narrow adapter surface between an editing framework and the
//! layout core: ordered children, fully resolved per-leaf formatting, and
//! absolute position counting. Positions follow the usual open/close token
//! scheme: a container node occupies `2 + content` positions, a leaf block or
//! an inline non-text node occupies 1, and text occupies one per character.

use serde::{Deserialize, Serialize};

use crate::model::{
    Alignment, CellPadding, ImageAnchor, ParagraphAttrs, RowHeight, RunFormatting,
    SectionProperties, VerticalAlign,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Document {
    /// Properties of the first section.
    pub section: SectionProperties,
    pub body: Vec<DocNode>,
    /// Header/footer stories per section index. Missing entries inherit the
    /// previous section's.
    pub header_footers: Vec<SectionHeaderFooters>,
    pub even_and_odd_headers: bool,
}

impl Document {
    pub fn content_size(&self) -> u32 {
        self.body.iter().map(DocNode::node_size).sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderFooterContent {
    pub default: Option<Vec<DocNode>>,
    pub first: Option<Vec<DocNode>>,
    pub even: Option<Vec<DocNode>>,
}

impl HeaderFooterContent {
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.first.is_none() && self.even.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionHeaderFooters {
    pub header: HeaderFooterContent,
    pub footer: HeaderFooterContent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocNode {
    Paragraph(DocParagraph),
    Table(DocTable),
    Image(DocImage),
    PageBreak,
    SectionBreak {
        #[serde(default)]
        properties: SectionProperties,
    },
}

impl DocNode {
    pub fn paragraph(content: Vec<Inline>) -> Self {
        DocNode::Paragraph(DocParagraph {
            attrs: ParagraphAttrs::default(),
            mark: None,
            content,
        })
    }

    pub fn node_size(&self) -> u32 {
        match self {
            DocNode::Paragraph(p) => 2 + p.content.iter().map(Inline::size).sum::<u32>(),
            DocNode::Table(t) => 2 + t.rows.iter().map(DocRow::node_size).sum::<u32>(),
            DocNode::Image(_) | DocNode::PageBreak | DocNode::SectionBreak { .. } => 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocParagraph {
    pub attrs: ParagraphAttrs,
    /// Formatting of the paragraph mark; sizes the caret line of an empty paragraph.
    pub mark: Option<RunFormatting>,
    pub content: Vec<Inline>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocTable {
    pub rows: Vec<DocRow>,
    pub column_widths: Vec<f32>,
    pub cell_padding: CellPadding,
    pub indent: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocRow {
    pub cells: Vec<DocCell>,
    pub height: Option<RowHeight>,
}

impl DocRow {
    pub fn node_size(&self) -> u32 {
        2 + self.cells.iter().map(DocCell::node_size).sum::<u32>()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocCell {
    pub col_span: u16,
    pub row_span: u16,
    pub width: Option<f32>,
    pub vertical_align: VerticalAlign,
    pub background: Option<[u8; 3]>,
    pub content: Vec<DocNode>,
}

impl Default for DocCell {
    fn default() -> Self {
        Self {
            col_span: 1,
            row_span: 1,
            width: None,
            vertical_align: VerticalAlign::Top,
            background: None,
            content: Vec::new(),
        }
    }
}

impl DocCell {
    pub fn node_size(&self) -> u32 {
        2 + self.content.iter().map(DocNode::node_size).sum::<u32>()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocImage {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub anchor: Option<ImageAnchor>,
    #[serde(default)]
    pub src: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inline {
    Text {
        text: String,
        #[serde(default)]
        marks: RunFormatting,
    },
    Tab {
        #[serde(default)]
        marks: RunFormatting,
    },
    HardBreak {
        #[serde(default)]
        marks: RunFormatting,
    },
    Image {
        width: f32,
        height: f32,
        #[serde(default)]
        src: Option<String>,
    },
}

impl Inline {
    pub fn text(text: impl Into<String>, marks: RunFormatting) -> Self {
        Inline::Text {
            text: text.into(),
            marks,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Inline::Text { text, .. } => text.chars().count() as u32,
            _ => 1,
        }
    }
}
