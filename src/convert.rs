//! Editable tree → `FlowBlock` conversion.

use crate::doc::{DocCell, DocNode, DocParagraph, DocRow, DocTable, Document, HeaderFooterContent, Inline};
use crate::model::{
    BlockIdGen, FlowBlock, ImageBlock, ImageRun, LineBreakRun, PageBreakBlock, ParagraphBlock, Run,
    SectionBreakBlock, SectionProperties, TabRun, TableBlock, TableCell, TableRow, TextRun,
};

#[derive(Clone, Debug, Default)]
pub struct HeaderFooterBlocks {
    pub default: Option<Vec<FlowBlock>>,
    pub first: Option<Vec<FlowBlock>>,
    pub even: Option<Vec<FlowBlock>>,
}

#[derive(Clone, Debug, Default)]
pub struct SectionHeaderFooterBlocks {
    pub header: HeaderFooterBlocks,
    pub footer: HeaderFooterBlocks,
    /// Section geometry, used to measure the stories at the right width.
    pub properties: SectionProperties,
}

#[derive(Clone, Debug)]
pub struct ConvertedDocument {
    pub blocks: Vec<FlowBlock>,
    pub initial_section: SectionProperties,
    /// One entry per section, index-aligned with `SectionBreakBlock::section_index`.
    pub header_footers: Vec<SectionHeaderFooterBlocks>,
    pub even_and_odd_headers: bool,
}

/// Convert a whole document: body blocks from position 0, then each section's
/// header/footer stories (each story has its own position space).
pub fn convert_document(doc: &Document, ids: &mut BlockIdGen) -> ConvertedDocument {
    let blocks = to_flow_blocks(&doc.body, 0, ids);

    let mut section_props = vec![doc.section.clone()];
    for block in &blocks {
        if let FlowBlock::SectionBreak(sb) = block {
            section_props.push(sb.properties.clone());
        }
    }

    let mut header_footers: Vec<SectionHeaderFooterBlocks> = Vec::with_capacity(section_props.len());
    for (idx, props) in section_props.into_iter().enumerate() {
        let converted = match doc.header_footers.get(idx) {
            Some(hf) if !(hf.header.is_empty() && hf.footer.is_empty()) => SectionHeaderFooterBlocks {
                header: convert_story_set(&hf.header, ids),
                footer: convert_story_set(&hf.footer, ids),
                properties: props,
            },
            _ => match header_footers.last() {
                Some(prev) => SectionHeaderFooterBlocks {
                    header: prev.header.clone(),
                    footer: prev.footer.clone(),
                    properties: props,
                },
                None => SectionHeaderFooterBlocks {
                    properties: props,
                    ..Default::default()
                },
            },
        };
        header_footers.push(converted);
    }

    log::debug!(
        "convert: {} blocks, {} sections, {} positions",
        blocks.len(),
        header_footers.len(),
        doc.content_size()
    );

    ConvertedDocument {
        blocks,
        initial_section: doc.section.clone(),
        header_footers,
        even_and_odd_headers: doc.even_and_odd_headers,
    }
}

fn convert_story_set(content: &HeaderFooterContent, ids: &mut BlockIdGen) -> HeaderFooterBlocks {
    let story = |nodes: &Option<Vec<DocNode>>, ids: &mut BlockIdGen| {
        nodes.as_ref().map(|n| to_flow_blocks(n, 0, ids))
    };
    HeaderFooterBlocks {
        default: story(&content.default, ids),
        first: story(&content.first, ids),
        even: story(&content.even, ids),
    }
}

/// Convert sibling nodes whose first node starts at document position `start`.
/// Section breaks are numbered from 1 in document order.
pub fn to_flow_blocks(nodes: &[DocNode], start: u32, ids: &mut BlockIdGen) -> Vec<FlowBlock> {
    let mut section_index = 0usize;
    let mut blocks = Vec::with_capacity(nodes.len());
    let mut pos = start;
    for node in nodes {
        blocks.push(convert_node(node, pos, ids, &mut section_index));
        pos += node.node_size();
    }
    blocks
}

fn convert_node(node: &DocNode, pos: u32, ids: &mut BlockIdGen, section_index: &mut usize) -> FlowBlock {
    match node {
        DocNode::Paragraph(p) => FlowBlock::Paragraph(convert_paragraph(p, pos, ids)),
        DocNode::Table(t) => FlowBlock::Table(convert_table(t, pos, ids)),
        DocNode::Image(img) => FlowBlock::Image(ImageBlock {
            id: ids.next_id(),
            pm_start: pos,
            pm_end: pos + 1,
            width: img.width,
            height: img.height,
            alignment: img.alignment,
            anchor: img.anchor,
            src: img.src.clone(),
        }),
        DocNode::PageBreak => FlowBlock::PageBreak(PageBreakBlock {
            id: ids.next_id(),
            pm_start: pos,
            pm_end: pos + 1,
        }),
        DocNode::SectionBreak { properties } => {
            *section_index += 1;
            FlowBlock::SectionBreak(SectionBreakBlock {
                id: ids.next_id(),
                pm_start: pos,
                pm_end: pos + 1,
                section_index: *section_index,
                properties: properties.clone(),
            })
        }
    }
}

fn convert_paragraph(p: &DocParagraph, pos: u32, ids: &mut BlockIdGen) -> ParagraphBlock {
    let mut runs: Vec<Run> = p
        .content
        .iter()
        .map(|inline| match inline {
            Inline::Text { text, marks } => Run::Text(TextRun {
                text: text.clone(),
                formatting: marks.clone(),
            }),
            Inline::Tab { marks } => Run::Tab(TabRun {
                formatting: marks.clone(),
            }),
            Inline::HardBreak { marks } => Run::LineBreak(LineBreakRun {
                formatting: marks.clone(),
            }),
            Inline::Image { width, height, src } => Run::Image(ImageRun {
                width: *width,
                height: *height,
                src: src.clone(),
            }),
        })
        .collect();

    // An empty paragraph still needs a caret-height line.
    if runs.is_empty() {
        runs.push(Run::text("", p.mark.clone().unwrap_or_default()));
    }

    let content_start = pos + 1;
    let content_size: u32 = p.content.iter().map(Inline::size).sum();
    ParagraphBlock {
        id: ids.next_id(),
        pm_start: content_start,
        pm_end: content_start + content_size,
        runs,
        attrs: p.attrs.clone(),
    }
}

fn convert_table(t: &DocTable, pos: u32, ids: &mut BlockIdGen) -> TableBlock {
    let id = ids.next_id();
    let mut row_pos = pos + 1;
    let rows: Vec<TableRow> = t
        .rows
        .iter()
        .map(|row| {
            let converted = convert_row(row, row_pos, ids);
            row_pos += row.node_size();
            converted
        })
        .collect();
    TableBlock {
        id,
        pm_start: pos,
        pm_end: row_pos + 1,
        rows,
        column_widths: t.column_widths.clone(),
        cell_padding: t.cell_padding,
        indent: t.indent,
    }
}

fn convert_row(row: &DocRow, pos: u32, ids: &mut BlockIdGen) -> TableRow {
    let mut cell_pos = pos + 1;
    let cells = row
        .cells
        .iter()
        .map(|cell| {
            let converted = convert_cell(cell, cell_pos, ids);
            cell_pos += cell.node_size();
            converted
        })
        .collect();
    TableRow {
        cells,
        height: row.height,
        pm_start: pos,
        pm_end: pos + row.node_size(),
    }
}

fn convert_cell(cell: &DocCell, pos: u32, ids: &mut BlockIdGen) -> TableCell {
    let mut blocks = to_flow_blocks(&cell.content, pos + 1, ids);
    if blocks.is_empty() {
        // Word cells always hold at least one paragraph.
        blocks.push(FlowBlock::Paragraph(ParagraphBlock {
            id: ids.next_id(),
            pm_start: pos + 1,
            pm_end: pos + 1,
            runs: vec![Run::text("", Default::default())],
            attrs: Default::default(),
        }));
    }
    TableCell {
        col_span: cell.col_span.max(1),
        row_span: cell.row_span.max(1),
        blocks,
        width: cell.width,
        vertical_align: cell.vertical_align,
        background: cell.background,
        pm_start: pos,
        pm_end: pos + cell.node_size(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::DocImage;
    use crate::model::RunFormatting;

    fn text(s: &str) -> Inline {
        Inline::text(s, RunFormatting::default())
    }

    #[test]
    fn paragraph_positions_skip_open_tokens() {
        let doc = Document {
            body: vec![
                DocNode::paragraph(vec![text("Hello")]),
                DocNode::paragraph(vec![text("ab"), Inline::Tab { marks: Default::default() }]),
            ],
            ..Default::default()
        };
        let converted = convert_document(&doc, &mut BlockIdGen::new());
        let ranges: Vec<(u32, u32)> = converted.blocks.iter().map(FlowBlock::pm_range).collect();
        assert_eq!(ranges, vec![(1, 6), (8, 11)]);
    }

    #[test]
    fn empty_paragraph_gets_placeholder_run() {
        let doc = Document {
            body: vec![DocNode::paragraph(vec![])],
            ..Default::default()
        };
        let converted = convert_document(&doc, &mut BlockIdGen::new());
        let FlowBlock::Paragraph(p) = &converted.blocks[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(p.runs.len(), 1);
        assert_eq!(p.pm_start, p.pm_end);
    }

    #[test]
    fn ids_are_reproducible() {
        let doc = Document {
            body: vec![
                DocNode::paragraph(vec![text("x")]),
                DocNode::Image(DocImage {
                    width: 10.0,
                    height: 10.0,
                    alignment: Default::default(),
                    anchor: None,
                    src: None,
                }),
            ],
            ..Default::default()
        };
        let a = convert_document(&doc, &mut BlockIdGen::new());
        let b = convert_document(&doc, &mut BlockIdGen::new());
        assert_eq!(a.blocks, b.blocks);
    }

    #[test]
    fn table_cells_nest_positions() {
        let cell = DocCell {
            content: vec![DocNode::paragraph(vec![text("ab")])],
            ..Default::default()
        };
        let doc = Document {
            body: vec![DocNode::Table(DocTable {
                rows: vec![DocRow {
                    cells: vec![cell.clone(), cell],
                    height: None,
                }],
                ..Default::default()
            })],
            ..Default::default()
        };
        let converted = convert_document(&doc, &mut BlockIdGen::new());
        let FlowBlock::Table(t) = &converted.blocks[0] else {
            panic!("expected table");
        };
        // table(0) row(1) cell(2) para(3) "ab"(4..6)
        assert_eq!(t.rows[0].cells[0].blocks[0].pm_range(), (4, 6));
        // close para 6, close cell 7, next cell 8, para 9, text 10..12
        assert_eq!(t.rows[0].cells[1].blocks[0].pm_range(), (10, 12));
        assert_eq!(t.pm_end, doc.content_size());
    }
}
