mod paragraph;
mod table;

use serde::{Deserialize, Serialize};

use crate::LayoutOptions;
use crate::fonts::TextMeasurer;
use crate::model::{FlowBlock, ParagraphBlock, SectionProperties};
use crate::paginate::section::{BreakDecision, SectionState, apply_pending_to_active, schedule_section_break};

pub use paragraph::{compute_line_pm_range, measure_paragraph};
pub use table::measure_table;

/// One measured line: the half-open run/char range `[from, to)` it covers
/// plus its extents. `offsets[k]` is the x of the caret stop `k` positions
/// after the line start (relative to the line's own start, before alignment).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasuredLine {
    pub from_run: usize,
    pub from_char: usize,
    pub to_run: usize,
    pub to_char: usize,
    pub width: f32,
    pub line_height: f32,
    pub ascent: f32,
    pub offsets: Vec<f32>,
}

impl MeasuredLine {
    /// Number of document positions on the line.
    pub fn position_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// X of the caret stop `k` positions after the line start, clamped.
    pub fn x_at(&self, k: usize) -> f32 {
        match self.offsets.get(k) {
            Some(&x) => x,
            None => self.offsets.last().copied().unwrap_or(0.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphMeasure {
    pub lines: Vec<MeasuredLine>,
    /// Sum of line heights; paragraph spacing is applied by the paginator.
    pub total_height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMeasure {
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<Measure>,
    pub grid_column: usize,
    pub col_span: usize,
    pub row_span: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowMeasure {
    pub cells: Vec<CellMeasure>,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeasure {
    pub rows: Vec<RowMeasure>,
    pub column_widths: Vec<f32>,
    pub total_width: f32,
    pub total_height: f32,
}

impl TableMeasure {
    /// X of grid column `col` relative to the table's left edge.
    pub fn column_x(&self, col: usize) -> f32 {
        self.column_widths.iter().take(col).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeasure {
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Measure {
    Paragraph(ParagraphMeasure),
    Table(TableMeasure),
    Image(ImageMeasure),
    PageBreak,
    SectionBreak,
}

impl Measure {
    pub fn height(&self) -> f32 {
        match self {
            Measure::Paragraph(m) => m.total_height,
            Measure::Table(m) => m.total_height,
            Measure::Image(m) => m.height,
            Measure::PageBreak | Measure::SectionBreak => 0.0,
        }
    }
}

pub fn measure_block(
    block: &FlowBlock,
    max_width: f32,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> Measure {
    match block {
        FlowBlock::Paragraph(p) => Measure::Paragraph(measure_paragraph(p, max_width, measurer, opts)),
        FlowBlock::Table(t) => Measure::Table(measure_table(t, max_width, measurer, opts)),
        FlowBlock::Image(img) => Measure::Image(ImageMeasure {
            width: img.width,
            height: img.height,
        }),
        FlowBlock::PageBreak(_) => Measure::PageBreak,
        FlowBlock::SectionBreak(_) => Measure::SectionBreak,
    }
}

/// Measure a block sequence, order-aligned with `blocks`. Each block is
/// measured at the column width the paginator will place it in: section
/// geometry changes at explicit page boundaries, a continuous break only
/// changes columns. Pending margins reached by overflowing onto a new page
/// are not seen here; those lines keep the width they were measured at.
pub fn measure_blocks(
    blocks: &[FlowBlock],
    initial_section: &SectionProperties,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> Vec<Measure> {
    let mut state = SectionState::from_properties(initial_section);
    blocks
        .iter()
        .map(|block| {
            match block {
                FlowBlock::SectionBreak(sb) => {
                    let transition = schedule_section_break(sb, &state);
                    state = transition.state;
                    if matches!(transition.decision, BreakDecision::NewPage { .. }) {
                        apply_pending_to_active(&mut state);
                    }
                }
                FlowBlock::PageBreak(_) => apply_pending_to_active(&mut state),
                FlowBlock::Paragraph(p) if p.attrs.page_break_before => apply_pending_to_active(&mut state),
                _ => {}
            }
            measure_block(block, state.column_width(), measurer, opts)
        })
        .collect()
}

fn paragraph_outer_height(p: &ParagraphBlock, m: &ParagraphMeasure) -> f32 {
    p.attrs.spacing.before + m.total_height + p.attrs.spacing.after
}

/// Vertical space a block takes when stacked in a cell or a header/footer story.
/// Anchored images float and take none.
pub fn stacked_height(block: &FlowBlock, measure: &Measure) -> f32 {
    match (block, measure) {
        (FlowBlock::Paragraph(p), Measure::Paragraph(m)) => paragraph_outer_height(p, m),
        (FlowBlock::Image(img), Measure::Image(m)) if img.anchor.is_none() => m.height,
        (FlowBlock::Image(_), Measure::Image(_)) => 0.0,
        (FlowBlock::Table(_), Measure::Table(m)) => m.total_height,
        _ => 0.0,
    }
}
