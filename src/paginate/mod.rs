pub mod header_footer;
pub mod section;

use serde::{Deserialize, Serialize};

use crate::LayoutOptions;
use crate::measure::{Measure, ParagraphMeasure, TableMeasure, compute_line_pm_range};
use crate::model::{
    Alignment, AnchorRelativeTo, BlockId, ColumnLayout, FieldKind, FlowBlock, ImageBlock,
    Orientation, PageMargins, PageSize, ParagraphBlock, TableBlock,
};

use header_footer::{HeaderFooterSet, HeaderFooterVariant, get_header_footer_for_page};
use section::{
    BreakDecision, PageParity, SectionState, apply_pending_to_active, schedule_section_break,
};

/// Slack for floating-point height comparisons.
const FIT_EPSILON: f32 = 0.01;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphFragment {
    pub block_id: BlockId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub from_line: usize,
    pub to_line: usize,
    pub pm_start: u32,
    pub pm_end: u32,
    pub continues_from_prev: bool,
    pub continues_on_next: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFragment {
    pub block_id: BlockId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub from_row: usize,
    pub to_row: usize,
    pub pm_start: u32,
    pub pm_end: u32,
    pub continues_from_prev: bool,
    pub continues_on_next: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFragment {
    pub block_id: BlockId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub pm_start: u32,
    pub pm_end: u32,
    pub anchored: bool,
}

/// A positioned slice of one block on one page. Coordinates are page-local.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Fragment {
    Paragraph(ParagraphFragment),
    Table(TableFragment),
    Image(ImageFragment),
}

impl Fragment {
    pub fn block_id(&self) -> BlockId {
        match self {
            Fragment::Paragraph(f) => f.block_id,
            Fragment::Table(f) => f.block_id,
            Fragment::Image(f) => f.block_id,
        }
    }

    pub fn pm_range(&self) -> (u32, u32) {
        match self {
            Fragment::Paragraph(f) => (f.pm_start, f.pm_end),
            Fragment::Table(f) => (f.pm_start, f.pm_end),
            Fragment::Image(f) => (f.pm_start, f.pm_end),
        }
    }

    /// (x, y, width, height)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        match self {
            Fragment::Paragraph(f) => (f.x, f.y, f.width, f.height),
            Fragment::Table(f) => (f.x, f.y, f.width, f.height),
            Fragment::Image(f) => (f.x, f.y, f.width, f.height),
        }
    }
}

/// A horizontal band of the body area with its own column layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub top: f32,
    pub bottom: f32,
    pub columns: ColumnLayout,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub number: usize,
    pub size: PageSize,
    pub orientation: Orientation,
    pub margins: PageMargins,
    pub section_index: usize,
    pub header: Option<HeaderFooterVariant>,
    pub footer: Option<HeaderFooterVariant>,
    pub content_top: f32,
    pub content_bottom: f32,
    pub regions: Vec<Region>,
    pub fragments: Vec<Fragment>,
}

impl Page {
    pub fn content_width(&self) -> f32 {
        (self.size.width - self.margins.left - self.margins.right).max(1.0)
    }
}

/// Values exposed to painters for resolving page-number fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    pub page_number: usize,
    pub total_pages: usize,
    pub section_index: usize,
}

impl RenderContext {
    pub fn resolve_field(&self, field: FieldKind) -> String {
        match field {
            FieldKind::Page => self.page_number.to_string(),
            FieldKind::NumPages => self.total_pages.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub pages: Vec<Page>,
    pub page_gap: f32,
}

impl Layout {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn render_context(&self, page_index: usize) -> Option<RenderContext> {
        let page = self.pages.get(page_index)?;
        Some(RenderContext {
            page_number: page.number,
            total_pages: self.pages.len(),
            section_index: page.section_index,
        })
    }

    /// All fragments of `block_id` in page order, with their page index.
    pub fn fragments_for(&self, block_id: BlockId) -> impl Iterator<Item = (usize, &Fragment)> {
        self.pages.iter().enumerate().flat_map(move |(idx, page)| {
            page.fragments
                .iter()
                .filter(move |f| f.block_id() == block_id)
                .map(move |f| (idx, f))
        })
    }
}

/// Height needed to start `block` at all: its first line or row.
fn leading_height(block: &FlowBlock, measure: &Measure) -> f32 {
    match (block, measure) {
        (FlowBlock::Paragraph(p), Measure::Paragraph(m)) => {
            p.attrs.spacing.before + m.lines.first().map(|l| l.line_height).unwrap_or(0.0)
        }
        (FlowBlock::Table(_), Measure::Table(m)) => m.rows.first().map(|r| r.height).unwrap_or(0.0),
        (FlowBlock::Image(img), Measure::Image(m)) if img.anchor.is_none() => m.height,
        _ => 0.0,
    }
}

/// Number of leading items whose heights fit in `available`.
fn count_fitting(heights: impl Iterator<Item = f32>, available: f32) -> usize {
    let mut used = 0.0f32;
    let mut n = 0;
    for h in heights {
        if used + h > available + FIT_EPSILON {
            break;
        }
        used += h;
        n += 1;
    }
    n
}

struct Paginator<'a> {
    opts: &'a LayoutOptions,
    header_footers: &'a HeaderFooterSet,
    state: SectionState,
    pages: Vec<Page>,
    column: usize,
    region_top: f32,
    cursor_y: f32,
    /// Lowest y reached in any column of the current region.
    region_max_y: f32,
    prev_after: f32,
    at_column_top: bool,
    /// Section whose first page has been opened.
    first_page_of: Option<usize>,
}

impl<'a> Paginator<'a> {
    fn new(state: SectionState, header_footers: &'a HeaderFooterSet, opts: &'a LayoutOptions) -> Self {
        let mut paginator = Self {
            opts,
            header_footers,
            state,
            pages: Vec::new(),
            column: 0,
            region_top: 0.0,
            cursor_y: 0.0,
            region_max_y: 0.0,
            prev_after: 0.0,
            at_column_top: true,
            first_page_of: None,
        };
        paginator.open_page();
        paginator
    }

    fn page(&self) -> &Page {
        &self.pages[self.pages.len() - 1]
    }

    fn page_mut(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn open_page(&mut self) {
        self.start_page(false);
    }

    /// Filler page of a parity break. It never counts as a section's first page.
    fn open_blank_page(&mut self) {
        self.start_page(true);
    }

    fn start_page(&mut self, blank: bool) {
        apply_pending_to_active(&mut self.state);

        let number = self.pages.len() + 1;
        let size = self.state.page_size.applied;
        let margins = self.state.margins.applied;
        let identity = self.state.section.applied;
        let columns = self.state.columns.applied;
        // A section reached through a continuous break starts on whichever page it first lands.
        let is_first_of_section = !blank && self.first_page_of != Some(identity.index);
        if is_first_of_section {
            self.first_page_of = Some(identity.index);
        }

        let even_odd = self.header_footers.even_and_odd_headers;
        let (header, header_h, footer, footer_h) = match self.header_footers.for_section(identity.index) {
            Some(hf) => {
                let header =
                    get_header_footer_for_page(&hf.header, number, is_first_of_section, identity.title_page, even_odd);
                let footer =
                    get_header_footer_for_page(&hf.footer, number, is_first_of_section, identity.title_page, even_odd);
                (
                    header.map(|(v, _)| v),
                    header.map(|(_, m)| m.total_height).unwrap_or(0.0),
                    footer.map(|(v, _)| v),
                    footer.map(|(_, m)| m.total_height).unwrap_or(0.0),
                )
            }
            None => (None, 0.0, None, 0.0),
        };

        let content_top = margins.top.max(margins.header + header_h);
        let mut content_bottom = size.height - margins.bottom.max(margins.footer + footer_h);
        if content_bottom <= content_top {
            log::warn!(
                "page {}: header/footer leave no body area ({:.1} ≥ {:.1})",
                number,
                content_top,
                content_bottom
            );
            content_bottom = content_top + 1.0;
        }

        log::debug!(
            "open page {} (section {}, first={}, body {:.1}..{:.1})",
            number,
            identity.index,
            is_first_of_section,
            content_top,
            content_bottom
        );

        self.pages.push(Page {
            number,
            size,
            orientation: self.state.orientation.applied,
            margins,
            section_index: identity.index,
            header,
            footer,
            content_top,
            content_bottom,
            regions: vec![Region {
                top: content_top,
                bottom: content_bottom,
                columns,
            }],
            fragments: Vec::new(),
        });
        self.column = 0;
        self.region_top = content_top;
        self.cursor_y = content_top;
        self.region_max_y = content_top;
        self.prev_after = 0.0;
        self.at_column_top = true;
    }

    fn columns(&self) -> ColumnLayout {
        self.page()
            .regions
            .last()
            .map(|r| r.columns)
            .unwrap_or_default()
    }

    fn column_x(&self) -> f32 {
        let page = self.page();
        page.margins.left + self.columns().column_x(self.column, page.content_width())
    }

    fn column_width(&self) -> f32 {
        self.columns().column_width(self.page().content_width())
    }

    fn content_bottom(&self) -> f32 {
        self.page().content_bottom
    }

    fn at_page_top(&self) -> bool {
        self.column == 0 && self.at_column_top && self.region_top <= self.page().content_top + FIT_EPSILON
    }

    /// True when moving on would not give more room: the column is empty and
    /// spans the full body height.
    fn fresh_column(&self) -> bool {
        self.at_column_top && self.region_top <= self.page().content_top + FIT_EPSILON
    }

    fn advance_column(&mut self) {
        if self.column + 1 < self.columns().count.max(1) as usize {
            self.column += 1;
            self.cursor_y = self.region_top;
            self.prev_after = 0.0;
            self.at_column_top = true;
        } else {
            self.open_page();
        }
    }

    fn placed(&mut self, bottom: f32) {
        self.cursor_y = bottom;
        self.region_max_y = self.region_max_y.max(bottom);
        self.at_column_top = false;
    }

    fn start_region(&mut self, columns: ColumnLayout) {
        if self.column == 0 && self.at_column_top {
            if let Some(region) = self.page_mut().regions.last_mut() {
                region.columns = columns;
            }
            return;
        }
        let top = self.region_max_y;
        let bottom = self.content_bottom();
        let page = self.page_mut();
        if let Some(region) = page.regions.last_mut() {
            region.bottom = top;
        }
        page.regions.push(Region { top, bottom, columns });
        self.column = 0;
        self.region_top = top;
        self.cursor_y = top;
        self.at_column_top = true;
    }

    fn push(&mut self, fragment: Fragment) {
        self.page_mut().fragments.push(fragment);
    }

    fn place_paragraph(&mut self, p: &ParagraphBlock, m: &ParagraphMeasure, next: Option<(&FlowBlock, &Measure)>) {
        if m.lines.is_empty() {
            log::debug!("paragraph {} has no lines, skipped", p.id);
            return;
        }
        if p.attrs.page_break_before && !self.at_page_top() {
            self.open_page();
        }

        let attrs = &p.attrs;
        let total = m.lines.len();
        let mut from = 0usize;
        while from < total {
            let gap = if self.at_column_top || from > 0 {
                0.0
            } else {
                self.prev_after.max(attrs.spacing.before)
            };
            let available = self.content_bottom() - self.cursor_y - gap;
            let remaining = total - from;
            let mut n = count_fitting(m.lines[from..].iter().map(|l| l.line_height), available);

            if n >= remaining {
                if from == 0 && attrs.keep_next && !self.fresh_column() {
                    let rest: f32 = m.lines.iter().map(|l| l.line_height).sum();
                    let next_h = next.map(|(b, nm)| leading_height(b, nm)).unwrap_or(0.0);
                    if self.cursor_y + gap + rest + attrs.spacing.after + next_h > self.content_bottom() + FIT_EPSILON {
                        log::debug!("paragraph {} kept with next, moved", p.id);
                        self.advance_column();
                        continue;
                    }
                }
                n = remaining;
            } else if n == 0 && self.fresh_column() {
                log::warn!(
                    "paragraph {} line {} taller than the body area, placed anyway",
                    p.id,
                    from
                );
                n = 1;
            } else if !self.fresh_column() {
                if from == 0 && attrs.keep_lines {
                    n = 0;
                } else if attrs.widow_control {
                    if from == 0 && n == 1 {
                        n = 0;
                    } else if remaining - n == 1 {
                        n = if n > 2 { n - 1 } else { 0 };
                    }
                }
            }

            if n == 0 {
                self.advance_column();
                continue;
            }

            let to = from + n;
            let height: f32 = m.lines[from..to].iter().map(|l| l.line_height).sum();
            let y = self.cursor_y + gap;
            let (pm_start, _) = compute_line_pm_range(p, &m.lines[from]);
            let (_, pm_end) = compute_line_pm_range(p, &m.lines[to - 1]);
            let fragment = Fragment::Paragraph(ParagraphFragment {
                block_id: p.id,
                x: self.column_x(),
                y,
                width: self.column_width(),
                height,
                from_line: from,
                to_line: to,
                pm_start,
                pm_end,
                continues_from_prev: from > 0,
                continues_on_next: to < total,
            });
            self.push(fragment);
            self.placed(y + height);
            self.prev_after = attrs.spacing.after;
            from = to;
            if from < total {
                self.advance_column();
            }
        }
    }

    fn place_table(&mut self, t: &TableBlock, m: &TableMeasure) {
        let total = m.rows.len();
        if total == 0 {
            log::debug!("table {} has no rows, skipped", t.id);
            return;
        }
        let mut from = 0usize;
        while from < total {
            let gap = if self.at_column_top { 0.0 } else { self.prev_after };
            let available = self.content_bottom() - self.cursor_y - gap;
            let mut n = count_fitting(m.rows[from..].iter().map(|r| r.height), available);
            if n == 0 {
                if self.fresh_column() {
                    log::warn!("table {} row {} taller than the body area, placed anyway", t.id, from);
                    n = 1;
                } else {
                    self.advance_column();
                    continue;
                }
            }

            let to = from + n;
            let height: f32 = m.rows[from..to].iter().map(|r| r.height).sum();
            let y = self.cursor_y + gap;
            let pm_start = if from == 0 { t.pm_start } else { t.rows[from].pm_start };
            let pm_end = if to == total { t.pm_end } else { t.rows[to - 1].pm_end };
            let fragment = Fragment::Table(TableFragment {
                block_id: t.id,
                x: self.column_x() + t.indent,
                y,
                width: m.total_width,
                height,
                from_row: from,
                to_row: to,
                pm_start,
                pm_end,
                continues_from_prev: from > 0,
                continues_on_next: to < total,
            });
            self.push(fragment);
            self.placed(y + height);
            self.prev_after = 0.0;
            from = to;
            if from < total {
                self.advance_column();
            }
        }
    }

    fn place_image(&mut self, img: &ImageBlock, width: f32, height: f32) {
        if let Some(anchor) = img.anchor {
            let page = self.page();
            let (x, y) = match anchor.relative_to {
                AnchorRelativeTo::Page => (anchor.x, anchor.y),
                AnchorRelativeTo::Margin => (page.margins.left + anchor.x, page.content_top + anchor.y),
                AnchorRelativeTo::Paragraph => (self.column_x() + anchor.x, self.cursor_y + anchor.y),
            };
            self.push(Fragment::Image(ImageFragment {
                block_id: img.id,
                x,
                y,
                width,
                height,
                pm_start: img.pm_start,
                pm_end: img.pm_end,
                anchored: true,
            }));
            return;
        }

        loop {
            let gap = if self.at_column_top { 0.0 } else { self.prev_after };
            if self.cursor_y + gap + height <= self.content_bottom() + FIT_EPSILON {
                break;
            }
            if self.fresh_column() {
                log::warn!("image {} taller than the body area, placed anyway", img.id);
                break;
            }
            self.advance_column();
        }

        let gap = if self.at_column_top { 0.0 } else { self.prev_after };
        let col_w = self.column_width();
        let dx = match img.alignment {
            Alignment::Center => ((col_w - width) / 2.0).max(0.0),
            Alignment::Right => (col_w - width).max(0.0),
            Alignment::Left | Alignment::Justify => 0.0,
        };
        let y = self.cursor_y + gap;
        self.push(Fragment::Image(ImageFragment {
            block_id: img.id,
            x: self.column_x() + dx,
            y,
            width,
            height,
            pm_start: img.pm_start,
            pm_end: img.pm_end,
            anchored: false,
        }));
        self.placed(y + height);
        self.prev_after = 0.0;
    }

    fn section_page_break(&mut self, parity: Option<PageParity>) {
        let next_number = self.pages.len() + 1;
        if let Some(parity) = parity {
            if !parity.matches(next_number) {
                log::debug!("{:?} section break inserts blank page {}", parity, next_number);
                self.open_blank_page();
            }
        }
        self.open_page();
    }

    fn finish(self) -> Layout {
        Layout {
            pages: self.pages,
            page_gap: self.opts.page_gap,
        }
    }
}

/// Place measured blocks onto pages. `blocks` and `measures` are order-aligned;
/// a kind mismatch skips the block.
pub fn paginate(
    blocks: &[FlowBlock],
    measures: &[Measure],
    initial_state: SectionState,
    header_footers: &HeaderFooterSet,
    opts: &LayoutOptions,
) -> Layout {
    if blocks.len() != measures.len() {
        log::warn!(
            "paginate: {} blocks but {} measures, extra entries ignored",
            blocks.len(),
            measures.len()
        );
    }
    let mut paginator = Paginator::new(initial_state, header_footers, opts);

    for (idx, (block, measure)) in blocks.iter().zip(measures).enumerate() {
        let next = blocks.get(idx + 1).zip(measures.get(idx + 1));
        match (block, measure) {
            (FlowBlock::Paragraph(p), Measure::Paragraph(m)) => paginator.place_paragraph(p, m, next),
            (FlowBlock::Table(t), Measure::Table(m)) => paginator.place_table(t, m),
            (FlowBlock::Image(img), Measure::Image(m)) => paginator.place_image(img, m.width, m.height),
            (FlowBlock::PageBreak(_), _) => paginator.open_page(),
            (FlowBlock::SectionBreak(sb), _) => {
                let transition = schedule_section_break(sb, &paginator.state);
                paginator.state = transition.state;
                match transition.decision {
                    BreakDecision::NewPage { parity } => paginator.section_page_break(parity),
                    BreakDecision::NewRegion { columns } => paginator.start_region(columns),
                    BreakDecision::Nothing => {}
                }
            }
            (block, _) => {
                log::debug!(
                    "block {} ({}) has a mismatched measure, skipped",
                    block.id(),
                    block.kind_name()
                );
            }
        }
    }

    paginator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_fitting_stops_at_first_overflow() {
        let heights = [10.0, 10.0, 30.0, 5.0];
        assert_eq!(count_fitting(heights.iter().copied(), 25.0), 2);
        assert_eq!(count_fitting(heights.iter().copied(), 5.0), 0);
        assert_eq!(count_fitting(heights.iter().copied(), 55.0), 4);
    }

    #[test]
    fn render_context_resolves_fields() {
        let ctx = RenderContext {
            page_number: 3,
            total_pages: 9,
            section_index: 0,
        };
        assert_eq!(ctx.resolve_field(FieldKind::Page), "3");
        assert_eq!(ctx.resolve_field(FieldKind::NumPages), "9");
    }
}
