#![allow(dead_code)]

use std::io::{Cursor, Write};

use docxide_layout::doc::{DocCell, DocNode, DocParagraph, DocRow, DocTable, Document, Inline};
use docxide_layout::fonts::FallbackMetrics;
use docxide_layout::measure::Measure;
use docxide_layout::model::{
    FlowBlock, ParagraphAttrs, ParagraphBlock, RowHeight, RowHeightRule, RunFormatting,
    SectionBreakType, SectionProperties,
};
use docxide_layout::paginate::{Fragment, Layout};
use docxide_layout::{DocumentLayout, LayoutOptions, layout_document};

/// US Letter with 1in margins: 648pt of body, 45 lines of 12pt text.
pub const BODY_HEIGHT: f32 = 648.0;
pub const LINE_HEIGHT: f32 = 14.4;

pub fn fmt() -> RunFormatting {
    RunFormatting::default()
}

pub fn text(s: &str) -> Inline {
    Inline::text(s, fmt())
}

pub fn para(s: &str) -> DocNode {
    DocNode::paragraph(vec![text(s)])
}

pub fn para_with(s: &str, attrs: ParagraphAttrs) -> DocNode {
    DocNode::Paragraph(DocParagraph {
        attrs,
        mark: None,
        content: vec![text(s)],
    })
}

/// `n` short words separated by spaces.
pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("word{}", i % 10)).collect::<Vec<_>>().join(" ")
}

/// A paragraph of 12pt "x" lines, each forced by a hard break.
pub fn lines_para(count: usize) -> DocNode {
    let mut content = Vec::new();
    for i in 0..count {
        if i > 0 {
            content.push(Inline::HardBreak { marks: fmt() });
        }
        content.push(text("x"));
    }
    DocNode::paragraph(content)
}

/// `node` (a paragraph) with its attributes replaced.
pub fn with_attrs(node: DocNode, attrs: ParagraphAttrs) -> DocNode {
    match node {
        DocNode::Paragraph(p) => DocNode::Paragraph(DocParagraph { attrs, ..p }),
        other => other,
    }
}

pub fn section_break(break_type: SectionBreakType, props: SectionProperties) -> DocNode {
    DocNode::SectionBreak {
        properties: SectionProperties { break_type, ..props },
    }
}

pub fn cell(s: &str) -> DocCell {
    DocCell {
        content: vec![para(s)],
        ..Default::default()
    }
}

pub fn row(cells: Vec<DocCell>, height: Option<f32>) -> DocRow {
    DocRow {
        cells,
        height: height.map(|value| RowHeight {
            value,
            rule: RowHeightRule::Exact,
        }),
    }
}

pub fn table(rows: Vec<DocRow>, column_widths: Vec<f32>) -> DocNode {
    DocNode::Table(DocTable {
        rows,
        column_widths,
        ..Default::default()
    })
}

pub fn doc(body: Vec<DocNode>) -> Document {
    Document {
        body,
        ..Default::default()
    }
}

pub fn lay_out(doc: &Document) -> DocumentLayout {
    layout_document(doc, &FallbackMetrics, &LayoutOptions::default())
}

pub fn paragraphs(blocks: &[FlowBlock]) -> impl Iterator<Item = &ParagraphBlock> {
    blocks.iter().filter_map(|b| match b {
        FlowBlock::Paragraph(p) => Some(p),
        _ => None,
    })
}

pub fn measure_of<'a>(result: &'a DocumentLayout, block: &FlowBlock) -> &'a Measure {
    let idx = result
        .blocks
        .iter()
        .position(|b| b.id() == block.id())
        .expect("block in layout");
    &result.measures[idx]
}

/// (page index, from, to) of every fragment of `block`, in page order.
pub fn fragment_spans(layout: &Layout, block: &FlowBlock) -> Vec<(usize, usize, usize)> {
    layout
        .fragments_for(block.id())
        .map(|(page, f)| match f {
            Fragment::Paragraph(p) => (page, p.from_line, p.to_line),
            Fragment::Table(t) => (page, t.from_row, t.to_row),
            Fragment::Image(_) => (page, 0, 1),
        })
        .collect()
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 0.01
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

pub const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

/// `word/document.xml` wrapping `body` (the children of `w:body`).
pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body>{body}</w:body></w:document>"#
    )
}

/// In-memory DOCX package from `(zip path, contents)` parts.
pub fn docx_bytes(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(CONTENT_TYPES.as_bytes()).unwrap();
    for (name, contents) in parts {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
