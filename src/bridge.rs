//! Document position ↔ layout geometry.
//!
//! All rectangles are in container coordinates: pages stacked top to bottom,
//! separated by `Layout::page_gap`, x measured from the page's left edge.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::measure::{Measure, MeasuredLine, ParagraphMeasure, TableMeasure, compute_line_pm_range};
use crate::model::{Alignment, BlockId, FlowBlock, ParagraphBlock, TableBlock, VerticalAlign};
use crate::paginate::{Fragment, Layout};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Y of the top edge of page `page_index` in container coordinates.
pub fn get_page_top(layout: &Layout, page_index: usize) -> f32 {
    layout
        .pages
        .iter()
        .take(page_index)
        .map(|p| p.size.height + layout.page_gap)
        .sum()
}

pub(crate) type BlockIndex<'a> = HashMap<BlockId, (&'a FlowBlock, &'a Measure)>;

pub(crate) fn index_blocks<'a>(blocks: &'a [FlowBlock], measures: &'a [Measure]) -> BlockIndex<'a> {
    blocks.iter().zip(measures).map(|(b, m)| (b.id(), (b, m))).collect()
}

/// A run of paragraph lines at a known page-local position.
pub(crate) struct LinePlacement<'a> {
    pub block: &'a ParagraphBlock,
    pub measure: &'a ParagraphMeasure,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub from_line: usize,
    pub to_line: usize,
}

pub(crate) struct PlacedLine<'a> {
    pub line: &'a MeasuredLine,
    pub pm_start: u32,
    pub pm_end: u32,
    pub x: f32,
    pub y: f32,
    pub is_last: bool,
}

impl<'a> LinePlacement<'a> {
    pub(crate) fn lines(&self) -> Vec<PlacedLine<'a>> {
        let attrs = &self.block.attrs;
        let total = self.measure.lines.len();
        let mut y = self.y;
        let mut out = Vec::with_capacity(self.to_line.saturating_sub(self.from_line));
        for k in self.from_line..self.to_line.min(total) {
            let line = &self.measure.lines[k];
            let first = if k == 0 { attrs.indent.first_line_offset() } else { 0.0 };
            let avail = (self.width - attrs.indent.left - attrs.indent.right - first).max(0.0);
            let slack = (avail - line.width).max(0.0);
            let align = match attrs.alignment {
                Alignment::Center => slack / 2.0,
                Alignment::Right => slack,
                Alignment::Left | Alignment::Justify => 0.0,
            };
            let (pm_start, pm_end) = compute_line_pm_range(self.block, line);
            out.push(PlacedLine {
                line,
                pm_start,
                pm_end,
                x: self.x + attrs.indent.left + first + align,
                y,
                is_last: k + 1 == total,
            });
            y += line.line_height;
        }
        out
    }
}

pub(crate) enum Placed<'a> {
    Lines(LinePlacement<'a>),
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pm_start: u32,
        pm_end: u32,
        src: Option<&'a str>,
    },
}

pub(crate) fn collect_stack<'a>(
    blocks: &'a [FlowBlock],
    measures: &'a [Measure],
    x: f32,
    y: f32,
    width: f32,
    out: &mut Vec<Placed<'a>>,
) {
    let mut y = y;
    for (block, measure) in blocks.iter().zip(measures) {
        match (block, measure) {
            (FlowBlock::Paragraph(p), Measure::Paragraph(m)) => {
                y += p.attrs.spacing.before;
                out.push(Placed::Lines(LinePlacement {
                    block: p,
                    measure: m,
                    x,
                    y,
                    width,
                    from_line: 0,
                    to_line: m.lines.len(),
                }));
                y += m.total_height + p.attrs.spacing.after;
            }
            (FlowBlock::Table(t), Measure::Table(m)) => {
                collect_table(t, m, x + t.indent, y, 0, m.rows.len(), out);
                y += m.total_height;
            }
            (FlowBlock::Image(img), Measure::Image(m)) => {
                out.push(Placed::Image {
                    x,
                    y,
                    width: m.width,
                    height: m.height,
                    pm_start: img.pm_start,
                    pm_end: img.pm_end,
                    src: img.src.as_deref(),
                });
                if img.anchor.is_none() {
                    y += m.height;
                }
            }
            _ => {}
        }
    }
}

fn collect_table<'a>(
    table: &'a TableBlock,
    m: &'a TableMeasure,
    x: f32,
    y: f32,
    from_row: usize,
    to_row: usize,
    out: &mut Vec<Placed<'a>>,
) {
    let pad = table.cell_padding;
    let end_row = to_row.min(m.rows.len());
    let mut row_y = y;
    for r in from_row..end_row {
        let (Some(row), Some(row_m)) = (table.rows.get(r), m.rows.get(r)) else {
            break;
        };
        for (cell, cell_m) in row.cells.iter().zip(&row_m.cells) {
            let box_h: f32 = m.rows[r..(r + cell_m.row_span).min(end_row)]
                .iter()
                .map(|rm| rm.height)
                .sum();
            let slack = (box_h - cell_m.height).max(0.0);
            let dy = match cell.vertical_align {
                VerticalAlign::Top => 0.0,
                VerticalAlign::Center => slack / 2.0,
                VerticalAlign::Bottom => slack,
            };
            collect_stack(
                &cell.blocks,
                &cell_m.blocks,
                x + m.column_x(cell_m.grid_column) + pad.left,
                row_y + pad.top + dy,
                (cell_m.width - pad.left - pad.right).max(1.0),
                out,
            );
        }
        row_y += row_m.height;
    }
}

pub(crate) fn collect_fragment<'a>(fragment: &Fragment, index: &BlockIndex<'a>, out: &mut Vec<Placed<'a>>) {
    let Some(&(block, measure)) = index.get(&fragment.block_id()) else {
        log::debug!("fragment for unknown block {}", fragment.block_id());
        return;
    };
    match (fragment, block, measure) {
        (Fragment::Paragraph(f), FlowBlock::Paragraph(p), Measure::Paragraph(m)) => {
            out.push(Placed::Lines(LinePlacement {
                block: p,
                measure: m,
                x: f.x,
                y: f.y,
                width: f.width,
                from_line: f.from_line,
                to_line: f.to_line,
            }));
        }
        (Fragment::Table(f), FlowBlock::Table(t), Measure::Table(m)) => {
            collect_table(t, m, f.x, f.y, f.from_row, f.to_row, out);
        }
        (Fragment::Image(f), _, _) => out.push(Placed::Image {
            x: f.x,
            y: f.y,
            width: f.width,
            height: f.height,
            pm_start: f.pm_start,
            pm_end: f.pm_end,
            src: match block {
                FlowBlock::Image(img) => img.src.as_deref(),
                _ => None,
            },
        }),
        _ => log::debug!("fragment/block kind mismatch for {}", fragment.block_id()),
    }
}

/// Rectangles covering the document range `[from, to)`. A collapsed or
/// inverted range, or one outside every fragment, yields no rectangles.
pub fn selection_to_rects(
    layout: &Layout,
    blocks: &[FlowBlock],
    measures: &[Measure],
    from: u32,
    to: u32,
) -> Vec<Rect> {
    if from >= to {
        return Vec::new();
    }
    let index = index_blocks(blocks, measures);
    let mut rects = Vec::new();

    for (page_index, page) in layout.pages.iter().enumerate() {
        let top = get_page_top(layout, page_index);
        let mut placed = Vec::new();
        for fragment in &page.fragments {
            let (start, end) = fragment.pm_range();
            if start < to && from < end {
                collect_fragment(fragment, &index, &mut placed);
            }
        }
        for item in &placed {
            match item {
                Placed::Lines(lp) => {
                    for pl in lp.lines() {
                        let s = from.max(pl.pm_start);
                        let e = to.min(pl.pm_end);
                        if s >= e {
                            continue;
                        }
                        // Spaces hanging past the line's width are not highlighted.
                        let x0 = pl.line.x_at((s - pl.pm_start) as usize).min(pl.line.width);
                        let x1 = pl.line.x_at((e - pl.pm_start) as usize).min(pl.line.width);
                        rects.push(Rect {
                            page_index,
                            x: pl.x + x0,
                            y: top + pl.y,
                            width: (x1 - x0).max(0.0),
                            height: pl.line.line_height,
                        });
                    }
                }
                Placed::Image {
                    x,
                    y,
                    width,
                    height,
                    pm_start,
                    pm_end,
                    ..
                } => {
                    if *pm_start < to && from < *pm_end {
                        rects.push(Rect {
                            page_index,
                            x: *x,
                            y: top + y,
                            width: *width,
                            height: *height,
                        });
                    }
                }
            }
        }
    }
    rects
}

/// Zero-width caret rectangle at `pos`, or `None` when no fragment holds it.
pub fn get_caret_position(
    layout: &Layout,
    blocks: &[FlowBlock],
    measures: &[Measure],
    pos: u32,
) -> Option<Rect> {
    let index = index_blocks(blocks, measures);

    for (page_index, page) in layout.pages.iter().enumerate() {
        let mut placed = Vec::new();
        for fragment in &page.fragments {
            let (start, end) = fragment.pm_range();
            if start <= pos && pos <= end {
                collect_fragment(fragment, &index, &mut placed);
            }
        }
        for item in &placed {
            let hit = match item {
                Placed::Lines(lp) => lp.lines().into_iter().find_map(|pl| {
                    let inside = pl.pm_start <= pos
                        && (pos < pl.pm_end || (pos == pl.pm_end && pl.is_last) || pl.pm_start == pl.pm_end);
                    inside.then(|| {
                        (
                            pl.x + pl.line.x_at((pos - pl.pm_start) as usize),
                            pl.y,
                            pl.line.line_height,
                        )
                    })
                }),
                Placed::Image {
                    x,
                    y,
                    width,
                    height,
                    pm_start,
                    pm_end,
                    ..
                } => (*pm_start <= pos && pos <= *pm_end)
                    .then(|| (if pos == *pm_start { *x } else { x + width }, *y, *height)),
            };
            if let Some((x, y, height)) = hit {
                return Some(Rect {
                    page_index,
                    x,
                    y: get_page_top(layout, page_index) + y,
                    width: 0.0,
                    height,
                });
            }
        }
    }
    None
}

/// Distance from `v` to the interval `[lo, hi]`.
fn gap_to(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo - v
    } else if v > hi {
        v - hi
    } else {
        0.0
    }
}

/// Nearest document position to container point `(x, y)`.
pub fn position_at_point(
    layout: &Layout,
    blocks: &[FlowBlock],
    measures: &[Measure],
    x: f32,
    y: f32,
) -> Option<u32> {
    let page_index = (0..layout.pages.len())
        .map(|i| {
            let top = get_page_top(layout, i);
            (i, gap_to(y, top, top + layout.pages[i].size.height))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)?;
    let page = &layout.pages[page_index];
    let local_y = y - get_page_top(layout, page_index);

    let index = index_blocks(blocks, measures);
    let mut placed = Vec::new();
    for fragment in &page.fragments {
        collect_fragment(fragment, &index, &mut placed);
    }

    // (dy, dx, position)
    let mut best: Option<(f32, f32, u32)> = None;
    let mut consider = |dy: f32, dx: f32, pos: u32| {
        let better = match best {
            None => true,
            Some((by, bx, _)) => dy < by || (dy == by && dx < bx),
        };
        if better {
            best = Some((dy, dx, pos));
        }
    };

    for item in &placed {
        match item {
            Placed::Lines(lp) => {
                for pl in lp.lines() {
                    let dy = gap_to(local_y, pl.y, pl.y + pl.line.line_height);
                    let dx = gap_to(x, pl.x, pl.x + pl.line.width);
                    let k = (0..pl.line.offsets.len())
                        .min_by(|&a, &b| {
                            let da = (pl.x + pl.line.offsets[a] - x).abs();
                            let db = (pl.x + pl.line.offsets[b] - x).abs();
                            da.total_cmp(&db)
                        })
                        .unwrap_or(0);
                    let pos = (pl.pm_start + k as u32).min(pl.pm_end);
                    consider(dy, dx, pos);
                }
            }
            Placed::Image {
                x: ix,
                y: iy,
                width,
                height,
                pm_start,
                pm_end,
                ..
            } => {
                let dy = gap_to(local_y, *iy, iy + height);
                let dx = gap_to(x, *ix, ix + width);
                let pos = if x < ix + width / 2.0 { *pm_start } else { *pm_end };
                consider(dy, dx, pos);
            }
        }
    }

    best.map(|(_, _, pos)| pos)
}
