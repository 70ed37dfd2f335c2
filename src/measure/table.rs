use super::{CellMeasure, RowMeasure, TableMeasure, measure_block, stacked_height};
use crate::LayoutOptions;
use crate::fonts::TextMeasurer;
use crate::model::{RowHeightRule, TableBlock};

/// Grid column of every cell, HTML-style: a cell spanning rows occupies slots
/// in the rows below it, which carry no placeholder cell for it.
/// Returns the per-row columns and the grid's column count.
fn place_cells(table: &TableBlock) -> (Vec<Vec<usize>>, usize) {
    let nrows = table.rows.len();
    let mut occupied: Vec<Vec<bool>> = vec![Vec::new(); nrows];
    let mut ncols = 0usize;

    let placements = table
        .rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let mut col = 0usize;
            row.cells
                .iter()
                .map(|cell| {
                    while occupied[r].get(col).copied().unwrap_or(false) {
                        col += 1;
                    }
                    let col_span = cell.col_span.max(1) as usize;
                    let row_span = (cell.row_span.max(1) as usize).min(nrows - r);
                    for slots in occupied.iter_mut().skip(r).take(row_span) {
                        if slots.len() < col + col_span {
                            slots.resize(col + col_span, false);
                        }
                        slots[col..col + col_span].fill(true);
                    }
                    let grid_column = col;
                    col += col_span;
                    ncols = ncols.max(col);
                    grid_column
                })
                .collect()
        })
        .collect();

    (placements, ncols)
}

fn resolve_column_widths(table: &TableBlock, ncols: usize, max_width: f32) -> Vec<f32> {
    let explicit = &table.column_widths;
    if explicit.len() == ncols && explicit.iter().sum::<f32>() > 0.0 {
        return explicit.clone();
    }
    if !explicit.is_empty() {
        log::debug!(
            "table {}: {} grid widths for {} columns, splitting evenly",
            table.id,
            explicit.len(),
            ncols
        );
    }
    let available = (max_width - table.indent).max(1.0);
    vec![available / ncols.max(1) as f32; ncols]
}

/// Measure a table: column widths, per-cell content heights and row heights.
/// A row-spanning cell's height counts toward its origin row only.
pub fn measure_table(
    block: &TableBlock,
    max_width: f32,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> TableMeasure {
    let (placements, ncols) = place_cells(block);
    let column_widths = resolve_column_widths(block, ncols, max_width);
    let pad = block.cell_padding;
    let nrows = block.rows.len();

    let rows: Vec<RowMeasure> = block
        .rows
        .iter()
        .zip(&placements)
        .enumerate()
        .map(|(r, (row, columns))| {
            let cells: Vec<CellMeasure> = row
                .cells
                .iter()
                .zip(columns)
                .map(|(cell, &grid_column)| {
                    let col_span = cell.col_span.max(1) as usize;
                    let end = column_widths.len().min(grid_column + col_span);
                    let width: f32 = column_widths[grid_column.min(end)..end].iter().sum();
                    let content_width = (width - pad.left - pad.right).max(1.0);
                    let blocks: Vec<_> = cell
                        .blocks
                        .iter()
                        .map(|b| measure_block(b, content_width, measurer, opts))
                        .collect();
                    let content: f32 = cell
                        .blocks
                        .iter()
                        .zip(&blocks)
                        .map(|(b, m)| stacked_height(b, m))
                        .sum();
                    CellMeasure {
                        width,
                        height: content + pad.top + pad.bottom,
                        blocks,
                        grid_column,
                        col_span,
                        row_span: (cell.row_span.max(1) as usize).min(nrows - r),
                    }
                })
                .collect();

            let content_h = cells.iter().map(|c| c.height).fold(0.0f32, f32::max);
            let height = match row.height {
                Some(h) if h.rule == RowHeightRule::Exact => h.value,
                Some(h) => content_h.max(h.value),
                None => content_h,
            };
            RowMeasure { cells, height }
        })
        .collect();

    let total_height = rows.iter().map(|r| r.height).sum();
    let total_width = column_widths.iter().sum();
    TableMeasure {
        rows,
        column_widths,
        total_width,
        total_height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockId, FlowBlock, ParagraphBlock, Run, TableCell, TableRow};

    fn cell(text: &str, row_span: u16) -> TableCell {
        TableCell {
            col_span: 1,
            row_span,
            blocks: vec![FlowBlock::Paragraph(ParagraphBlock {
                id: BlockId(0),
                pm_start: 0,
                pm_end: text.chars().count() as u32,
                runs: vec![Run::text(text, Default::default())],
                attrs: Default::default(),
            })],
            width: None,
            vertical_align: Default::default(),
            background: None,
            pm_start: 0,
            pm_end: 0,
        }
    }

    fn table(rows: Vec<Vec<TableCell>>) -> TableBlock {
        TableBlock {
            id: BlockId(1),
            pm_start: 0,
            pm_end: 0,
            rows: rows
                .into_iter()
                .map(|cells| TableRow {
                    cells,
                    height: None,
                    pm_start: 0,
                    pm_end: 0,
                })
                .collect(),
            column_widths: Vec::new(),
            cell_padding: Default::default(),
            indent: 0.0,
        }
    }

    #[test]
    fn row_span_shifts_cells_below() {
        let t = table(vec![vec![cell("a", 2), cell("b", 1)], vec![cell("c", 1)]]);
        let (placements, ncols) = place_cells(&t);
        assert_eq!(ncols, 2);
        assert_eq!(placements, vec![vec![0, 1], vec![1]]);
    }

    #[test]
    fn mismatched_grid_falls_back_to_even_split() {
        let mut t = table(vec![vec![cell("a", 1), cell("b", 1)]]);
        t.column_widths = vec![100.0];
        let m = measure_table(&t, 300.0, &crate::fonts::FallbackMetrics, &LayoutOptions::default());
        assert_eq!(m.column_widths, vec![150.0, 150.0]);
        assert_eq!(m.total_width, 300.0);
        assert_eq!(m.rows[0].cells[1].grid_column, 1);
    }
}
