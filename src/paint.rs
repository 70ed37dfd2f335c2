//! Reference HTML painter.
//!
//! Pages, fragments, lines and text spans are emitted as absolutely positioned
//! elements. Every element that maps back to the document carries
//! [`ATTR_PM_START`] / [`ATTR_PM_END`], which is what a DOM-side position
//! mapper reads; fragments also carry [`ATTR_BLOCK_ID`].

use std::fmt::Write;

use crate::bridge::{BlockIndex, Placed, PlacedLine, collect_fragment, collect_stack, get_page_top, index_blocks};
use crate::measure::Measure;
use crate::model::{FlowBlock, Run, RunFormatting, TableBlock};
use crate::paginate::header_footer::{
    HeaderFooterMeasure, HeaderFooterMeasurements, HeaderFooterSet, HeaderFooterVariant,
};
use crate::paginate::{Fragment, Layout, Page, RenderContext};

pub const ATTR_PM_START: &str = "data-pm-start";
pub const ATTR_PM_END: &str = "data-pm-end";
pub const ATTR_BLOCK_ID: &str = "data-block-id";

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn css_color([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn run_style(fmt: &RunFormatting) -> String {
    let mut style = format!(
        "font-family:'{}';font-size:{:.2}pt",
        escape_html(crate::fonts::primary_font_name(&fmt.font_family)),
        fmt.font_size
    );
    if fmt.bold {
        style.push_str(";font-weight:bold");
    }
    if fmt.italic {
        style.push_str(";font-style:italic");
    }
    match (fmt.underline, fmt.strike) {
        (true, true) => style.push_str(";text-decoration:underline line-through"),
        (true, false) => style.push_str(";text-decoration:underline"),
        (false, true) => style.push_str(";text-decoration:line-through"),
        (false, false) => {}
    }
    if let Some(color) = fmt.color {
        let _ = write!(style, ";color:{}", css_color(color));
    }
    if let Some(bg) = fmt.highlight {
        let _ = write!(style, ";background:{}", css_color(bg));
    }
    style
}

fn paint_line(out: &mut String, pl: &PlacedLine, runs: &[Run], ctx: &RenderContext) {
    let line = pl.line;
    let _ = write!(
        out,
        r#"<div class="line" {}="{}" {}="{}" style="position:absolute;left:{:.2}pt;top:{:.2}pt;height:{:.2}pt;width:{:.2}pt">"#,
        ATTR_PM_START,
        pl.pm_start,
        ATTR_PM_END,
        pl.pm_end,
        pl.x,
        pl.y,
        line.line_height,
        line.width,
    );

    let mut k = 0usize;
    let last_run = line.to_run.min(runs.len().saturating_sub(1));
    for (r, run) in runs.iter().enumerate().take(last_run + 1).skip(line.from_run) {
        let size = run.pm_size() as usize;
        let a = if r == line.from_run { line.from_char } else { 0 };
        let b = if r == line.to_run { line.to_char } else { size };
        if b <= a {
            continue;
        }
        let x = line.x_at(k);
        let pm = pl.pm_start + k as u32;
        match run {
            Run::Text(t) => {
                let text: String = match t.formatting.field {
                    Some(field) => ctx.resolve_field(field),
                    None => t.text.chars().skip(a).take(b - a).collect(),
                };
                let _ = write!(
                    out,
                    r#"<span {}="{}" {}="{}" style="position:absolute;left:{:.2}pt;bottom:{:.2}pt;white-space:pre;{}">{}</span>"#,
                    ATTR_PM_START,
                    pm,
                    ATTR_PM_END,
                    pm + (b - a) as u32,
                    x,
                    line.line_height - line.ascent,
                    run_style(&t.formatting),
                    escape_html(&text),
                );
            }
            Run::Image(img) => {
                let _ = write!(
                    out,
                    r#"<img {}="{}" {}="{}" src="{}" style="position:absolute;left:{:.2}pt;bottom:{:.2}pt;width:{:.2}pt;height:{:.2}pt">"#,
                    ATTR_PM_START,
                    pm,
                    ATTR_PM_END,
                    pm + 1,
                    escape_html(img.src.as_deref().unwrap_or("")),
                    x,
                    line.line_height - line.ascent,
                    img.width,
                    img.height,
                );
            }
            Run::Tab(_) | Run::LineBreak(_) => {}
        }
        k += b - a;
    }
    out.push_str("</div>");
}

fn paint_placed(out: &mut String, placed: &[Placed], ctx: &RenderContext) {
    for item in placed {
        match item {
            Placed::Lines(lp) => {
                for pl in lp.lines() {
                    paint_line(out, &pl, &lp.block.runs, ctx);
                }
            }
            Placed::Image {
                x,
                y,
                width,
                height,
                pm_start,
                pm_end,
                src,
            } => {
                let _ = write!(
                    out,
                    r#"<img {}="{}" {}="{}" src="{}" style="position:absolute;left:{:.2}pt;top:{:.2}pt;width:{:.2}pt;height:{:.2}pt">"#,
                    ATTR_PM_START,
                    pm_start,
                    ATTR_PM_END,
                    pm_end,
                    escape_html(src.unwrap_or("")),
                    x,
                    y,
                    width,
                    height,
                );
            }
        }
    }
}

/// Cell backgrounds of the rows a table fragment shows.
fn paint_cell_backgrounds(out: &mut String, t: &TableBlock, m: &crate::measure::TableMeasure, x: f32, y: f32, from: usize, to: usize) {
    let mut row_y = y;
    for r in from..to.min(m.rows.len()) {
        let (Some(row), Some(row_m)) = (t.rows.get(r), m.rows.get(r)) else {
            break;
        };
        for (cell, cell_m) in row.cells.iter().zip(&row_m.cells) {
            let Some(bg) = cell.background else {
                continue;
            };
            let h: f32 = m.rows[r..(r + cell_m.row_span).min(to).min(m.rows.len())]
                .iter()
                .map(|rm| rm.height)
                .sum();
            let _ = write!(
                out,
                r#"<div class="cell" style="position:absolute;left:{:.2}pt;top:{:.2}pt;width:{:.2}pt;height:{:.2}pt;background:{}"></div>"#,
                x + m.column_x(cell_m.grid_column),
                row_y,
                cell_m.width,
                h,
                css_color(bg),
            );
        }
        row_y += row_m.height;
    }
}

fn paint_fragment(out: &mut String, fragment: &Fragment, index: &BlockIndex, ctx: &RenderContext) {
    let (x, y, w, h) = fragment.bounds();
    let (pm_start, pm_end) = fragment.pm_range();
    let kind = match fragment {
        Fragment::Paragraph(_) => "paragraph",
        Fragment::Table(_) => "table",
        Fragment::Image(_) => "image",
    };
    let _ = write!(
        out,
        r#"<div class="fragment {}" {}="{}" {}="{}" {}="{}" data-box="{:.2} {:.2} {:.2} {:.2}">"#,
        kind,
        ATTR_BLOCK_ID,
        fragment.block_id(),
        ATTR_PM_START,
        pm_start,
        ATTR_PM_END,
        pm_end,
        x,
        y,
        w,
        h,
    );
    if let Fragment::Table(f) = fragment {
        if let Some((FlowBlock::Table(t), Measure::Table(m))) = index.get(&f.block_id).copied() {
            paint_cell_backgrounds(out, t, m, f.x, f.y, f.from_row, f.to_row);
        }
    }
    let mut placed = Vec::new();
    collect_fragment(fragment, index, &mut placed);
    paint_placed(out, &placed, ctx);
    out.push_str("</div>");
}

fn paint_story(
    out: &mut String,
    class: &str,
    story: Option<&HeaderFooterMeasure>,
    page: &Page,
    is_header: bool,
    ctx: &RenderContext,
) {
    let Some(story) = story else {
        return;
    };
    let y = if is_header {
        page.margins.header
    } else {
        page.size.height - page.margins.footer - story.total_height
    };
    let _ = write!(out, r#"<div class="{}">"#, class);
    let mut placed = Vec::new();
    collect_stack(&story.blocks, &story.measures, page.margins.left, y, page.content_width(), &mut placed);
    paint_placed(out, &placed, ctx);
    out.push_str("</div>");
}

fn variant_story(m: &HeaderFooterMeasurements, variant: Option<HeaderFooterVariant>) -> Option<&HeaderFooterMeasure> {
    match variant? {
        HeaderFooterVariant::Default => m.default.as_ref(),
        HeaderFooterVariant::First => m.first.as_ref(),
        HeaderFooterVariant::Even => m.even.as_ref(),
    }
}

/// Render the whole layout as a standalone HTML document.
pub fn paint_html(layout: &Layout, blocks: &[FlowBlock], measures: &[Measure], header_footers: &HeaderFooterSet) -> String {
    let index = index_blocks(blocks, measures);
    let width = layout.pages.iter().map(|p| p.size.width).fold(0.0f32, f32::max);
    let height = get_page_top(layout, layout.pages.len());

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>");
    out.push_str(".pages{position:relative;background:#e5e5e5}.page{position:absolute;left:0;background:#fff;overflow:hidden}");
    out.push_str("</style></head><body>\n");
    let _ = writeln!(
        out,
        r#"<div class="pages" style="width:{:.2}pt;height:{:.2}pt">"#,
        width, height
    );

    for (page_index, page) in layout.pages.iter().enumerate() {
        let Some(ctx) = layout.render_context(page_index) else {
            continue;
        };
        let _ = write!(
            out,
            r#"<section class="page" data-page-number="{}" data-section="{}" style="top:{:.2}pt;width:{:.2}pt;height:{:.2}pt">"#,
            page.number,
            page.section_index,
            get_page_top(layout, page_index),
            page.size.width,
            page.size.height,
        );
        if let Some(hf) = header_footers.for_section(page.section_index) {
            paint_story(&mut out, "header", variant_story(&hf.header, page.header), page, true, &ctx);
            paint_story(&mut out, "footer", variant_story(&hf.footer, page.footer), page, false, &ctx);
        }
        for fragment in &page.fragments {
            paint_fragment(&mut out, fragment, &index, &ctx);
        }
        out.push_str("</section>\n");
    }

    out.push_str("</div>\n</body></html>\n");
    out
}
