use super::{MeasuredLine, ParagraphMeasure};
use crate::LayoutOptions;
use crate::fonts::TextMeasurer;
use crate::model::{LineSpacing, ParagraphBlock, Run, RunFormatting, TabAlignment, TabStop};

/// Slack for floating-point width comparisons.
const FIT_EPSILON: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
enum AtomKind {
    Char(char),
    Tab,
    Break,
    Image,
}

/// One document position inside the paragraph. Atom `i` is the content at
/// offset `i` from the paragraph's `pm_start`.
#[derive(Clone, Copy, Debug)]
struct Atom {
    kind: AtomKind,
    width: f32,
    height: f32,
    ascent: f32,
}

impl Atom {
    fn is_break_space(&self) -> bool {
        matches!(self.kind, AtomKind::Char(c) if is_break_space(c))
    }

    fn is_word_char(&self) -> bool {
        matches!(self.kind, AtomKind::Char(c) if !is_break_space(c))
    }
}

/// Whitespace that offers a line-break opportunity (no-break spaces excluded).
fn is_break_space(c: char) -> bool {
    c.is_whitespace() && c != '\u{00A0}' && c != '\u{202F}' && c != '\u{2007}'
}

fn text_metrics(fmt: &RunFormatting, spacing: LineSpacing, measurer: &dyn TextMeasurer) -> (f32, f32) {
    let height = spacing.resolve(fmt.font_size, measurer.line_height_ratio(fmt));
    let ascent = fmt.font_size * measurer.ascent_ratio(fmt);
    (height, ascent)
}

fn collect_atoms(block: &ParagraphBlock, measurer: &dyn TextMeasurer) -> Vec<Atom> {
    let spacing = block.attrs.spacing.line;
    let mut atoms = Vec::new();
    for run in &block.runs {
        match run {
            Run::Text(t) => {
                let (height, ascent) = text_metrics(&t.formatting, spacing, measurer);
                atoms.extend(t.text.chars().map(|ch| Atom {
                    kind: AtomKind::Char(ch),
                    width: measurer.char_width(ch, &t.formatting),
                    height,
                    ascent,
                }));
            }
            Run::Tab(t) => {
                let (height, ascent) = text_metrics(&t.formatting, spacing, measurer);
                atoms.push(Atom {
                    kind: AtomKind::Tab,
                    width: 0.0,
                    height,
                    ascent,
                });
            }
            Run::LineBreak(b) => {
                let (height, ascent) = text_metrics(&b.formatting, spacing, measurer);
                atoms.push(Atom {
                    kind: AtomKind::Break,
                    width: 0.0,
                    height,
                    ascent,
                });
            }
            Run::Image(img) => {
                let height = match spacing {
                    LineSpacing::Exact(pts) => pts,
                    _ => img.height,
                };
                atoms.push(Atom {
                    kind: AtomKind::Image,
                    width: img.width,
                    height,
                    ascent: img.height.min(height),
                });
            }
        }
    }
    atoms
}

/// Maps flat atom offsets back to (run, char) coordinates.
struct RunIndex {
    starts: Vec<usize>,
    sizes: Vec<usize>,
    total: usize,
}

impl RunIndex {
    fn new(runs: &[Run]) -> Self {
        let mut starts = Vec::with_capacity(runs.len());
        let mut sizes = Vec::with_capacity(runs.len());
        let mut total = 0usize;
        for run in runs {
            starts.push(total);
            let size = run.pm_size() as usize;
            sizes.push(size);
            total += size;
        }
        Self { starts, sizes, total }
    }

    /// Coordinates of the position ending at `flat` (exclusive end).
    fn locate_end(&self, flat: usize) -> (usize, usize) {
        (0..self.starts.len())
            .rev()
            .find(|&r| self.starts[r] < flat)
            .map(|r| (r, flat - self.starts[r]))
            .unwrap_or((0, 0))
    }

    /// Coordinates of the position starting at `flat`.
    fn locate_start(&self, flat: usize) -> (usize, usize) {
        if flat >= self.total {
            return self.locate_end(self.total);
        }
        (0..self.starts.len())
            .find(|&r| self.starts[r] + self.sizes[r] > flat)
            .map(|r| (r, flat - self.starts[r]))
            .unwrap_or((0, 0))
    }
}

/// Next tab stop after `abs_x` (measured from the paragraph's left edge).
fn find_next_tab_stop(abs_x: f32, tab_stops: &[TabStop], hanging_stop: Option<f32>, interval: f32) -> TabStop {
    let explicit = tab_stops.iter().find(|stop| stop.position > abs_x + 0.5);
    if let Some(hang) = hanging_stop.filter(|&h| h > abs_x + 0.5) {
        if explicit.is_none_or(|stop| stop.position > hang) {
            return TabStop {
                position: hang,
                alignment: TabAlignment::Left,
                leader: None,
            };
        }
    }
    if let Some(stop) = explicit {
        return stop.clone();
    }
    let interval = if interval > 0.0 { interval } else { 36.0 };
    TabStop {
        position: ((abs_x / interval).floor() + 1.0) * interval,
        alignment: TabAlignment::Left,
        leader: None,
    }
}

/// Width of the atoms after a tab up to the next tab or break.
fn segment_width(atoms: &[Atom]) -> f32 {
    atoms
        .iter()
        .take_while(|a| !matches!(a.kind, AtomKind::Tab | AtomKind::Break))
        .map(|a| a.width)
        .sum()
}

/// Width of the segment before its first decimal point.
fn decimal_before_width(atoms: &[Atom]) -> f32 {
    atoms
        .iter()
        .take_while(|a| !matches!(a.kind, AtomKind::Tab | AtomKind::Break | AtomKind::Char('.')))
        .map(|a| a.width)
        .sum()
}

struct LineBuilder {
    start: usize,
    x: f32,
    content_width: f32,
    has_content: bool,
    height: f32,
    ascent: f32,
    offsets: Vec<f32>,
}

impl LineBuilder {
    fn new(start: usize) -> Self {
        Self {
            start,
            x: 0.0,
            content_width: 0.0,
            has_content: false,
            height: 0.0,
            ascent: 0.0,
            offsets: vec![0.0],
        }
    }

    fn place(&mut self, atom: &Atom, advance: f32) {
        self.x += advance;
        self.offsets.push(self.x);
        self.height = self.height.max(atom.height);
        self.ascent = self.ascent.max(atom.ascent);
        if !atom.is_break_space() && atom.kind != AtomKind::Break {
            self.content_width = self.x;
            self.has_content = true;
        }
    }
}

struct LineFill<'a> {
    index: RunIndex,
    lines: Vec<MeasuredLine>,
    fallback: (f32, f32),
    block: &'a ParagraphBlock,
}

impl LineFill<'_> {
    fn close(&mut self, line: LineBuilder, end: usize) {
        let (from_run, from_char) = self.index.locate_start(line.start);
        let (to_run, to_char) = if end == line.start {
            (from_run, from_char)
        } else {
            self.index.locate_end(end)
        };
        let (height, ascent) = if line.height > 0.0 {
            (line.height, line.ascent)
        } else {
            self.fallback
        };
        self.fallback = (height, ascent);
        self.lines.push(MeasuredLine {
            from_run,
            from_char,
            to_run,
            to_char,
            width: line.content_width,
            line_height: height,
            ascent,
            offsets: line.offsets,
        });
    }

    fn available(&self, max_width: f32, line_no: usize) -> f32 {
        let indent = &self.block.attrs.indent;
        let first = if line_no == 0 {
            indent.first_line_offset()
        } else {
            0.0
        };
        (max_width - indent.left - indent.right - first).max(0.0)
    }

    /// Left edge of line `line_no` measured from the paragraph's left edge.
    fn line_origin(&self, line_no: usize) -> f32 {
        let indent = &self.block.attrs.indent;
        indent.left + if line_no == 0 { indent.first_line_offset() } else { 0.0 }
    }
}

/// Break a paragraph into lines that fit `max_width` (the column or cell
/// content width; paragraph indents are subtracted here).
pub fn measure_paragraph(
    block: &ParagraphBlock,
    max_width: f32,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> ParagraphMeasure {
    let atoms = collect_atoms(block, measurer);
    let mut tab_stops = block.attrs.tab_stops.clone();
    tab_stops.sort_by(|a, b| a.position.total_cmp(&b.position));
    let hanging_stop = (block.attrs.indent.first_line_offset() < 0.0).then_some(block.attrs.indent.left);

    let mut fill = LineFill {
        index: RunIndex::new(&block.runs),
        lines: Vec::new(),
        fallback: text_metrics(&block.default_formatting(), block.attrs.spacing.line, measurer),
        block,
    };
    let mut line = LineBuilder::new(0);

    let mut i = 0;
    while i < atoms.len() {
        let atom = atoms[i];
        let avail = fill.available(max_width, fill.lines.len());
        match atom.kind {
            AtomKind::Char(_) if atom.is_word_char() => {
                let end = (i..atoms.len())
                    .find(|&j| !atoms[j].is_word_char())
                    .unwrap_or(atoms.len());
                let word_w: f32 = atoms[i..end].iter().map(|a| a.width).sum();
                if line.has_content && line.x + word_w > avail + FIT_EPSILON {
                    fill.close(line, i);
                    line = LineBuilder::new(i);
                }
                for a in &atoms[i..end] {
                    line.place(a, a.width);
                }
                i = end;
                continue;
            }
            AtomKind::Char(_) => line.place(&atom, atom.width),
            AtomKind::Tab => {
                let origin = fill.line_origin(fill.lines.len());
                let stop = find_next_tab_stop(
                    line.x + origin,
                    &tab_stops,
                    if fill.lines.is_empty() { hanging_stop } else { None },
                    opts.default_tab_interval,
                );
                let target = stop.position - origin;
                let rest = &atoms[i + 1..];
                let new_x = match stop.alignment {
                    TabAlignment::Left => target,
                    TabAlignment::Right => target - segment_width(rest),
                    TabAlignment::Center => target - segment_width(rest) / 2.0,
                    TabAlignment::Decimal => target - decimal_before_width(rest),
                };
                line.place(&atom, (new_x - line.x).max(0.0));
            }
            AtomKind::Image => {
                if line.has_content && line.x + atom.width > avail + FIT_EPSILON {
                    fill.close(line, i);
                    line = LineBuilder::new(i);
                }
                line.place(&atom, atom.width);
            }
            AtomKind::Break => {
                line.place(&atom, 0.0);
                fill.close(line, i + 1);
                line = LineBuilder::new(i + 1);
            }
        }
        i += 1;
    }

    let ends_with_break = atoms.last().is_some_and(|a| a.kind == AtomKind::Break);
    if line.start < atoms.len() || fill.lines.is_empty() || ends_with_break {
        fill.close(line, atoms.len());
    }

    let lines = fill.lines;
    let total_height = lines.iter().map(|l| l.line_height).sum();
    ParagraphMeasure { lines, total_height }
}

/// Document range `[start, end)` covered by `line`.
pub fn compute_line_pm_range(block: &ParagraphBlock, line: &MeasuredLine) -> (u32, u32) {
    let mut pos = block.pm_start;
    let mut start = block.pm_start;
    let mut end = block.pm_start;
    for (idx, run) in block.runs.iter().enumerate() {
        if idx == line.from_run {
            start = pos + line.from_char as u32;
        }
        if idx == line.to_run {
            end = pos + line.to_char as u32;
        }
        pos += run.pm_size();
    }
    (start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FallbackMetrics;
    use crate::model::{BlockId, LineBreakRun, ParagraphAttrs, TabRun};

    fn fmt10() -> RunFormatting {
        RunFormatting {
            font_size: 10.0,
            ..Default::default()
        }
    }

    fn para(runs: Vec<Run>, attrs: ParagraphAttrs) -> ParagraphBlock {
        let size: u32 = runs.iter().map(Run::pm_size).sum();
        ParagraphBlock {
            id: BlockId(0),
            pm_start: 1,
            pm_end: 1 + size,
            runs,
            attrs,
        }
    }

    fn measure(block: &ParagraphBlock, width: f32) -> ParagraphMeasure {
        measure_paragraph(block, width, &FallbackMetrics, &LayoutOptions::default())
    }

    #[test]
    fn wraps_at_word_boundary_and_hangs_spaces() {
        // "aaaa" = 22.24pt, space = 2.78pt at 10pt
        let block = para(vec![Run::text("aaaa bbbb", fmt10())], ParagraphAttrs::default());
        let m = measure(&block, 30.0);
        assert_eq!(m.lines.len(), 2);
        let first = &m.lines[0];
        assert_eq!((first.from_run, first.from_char, first.to_run, first.to_char), (0, 0, 0, 5));
        assert!((first.width - 22.24).abs() < 1e-3);
        assert_eq!(first.offsets.len(), 6);
        assert_eq!((m.lines[1].from_char, m.lines[1].to_char), (5, 9));
        assert!((m.total_height - 24.0).abs() < 1e-3);
    }

    #[test]
    fn word_clusters_span_runs() {
        let bold = RunFormatting { bold: true, ..fmt10() };
        let block = para(
            vec![Run::text("aa", fmt10()), Run::text("bb", bold), Run::text(" c", fmt10())],
            ParagraphAttrs::default(),
        );
        // "aabb" does not fit next to nothing else; it must not split at the run boundary.
        let m = measure(&block, 15.0);
        assert_eq!(m.lines.len(), 2);
        assert_eq!((m.lines[0].to_run, m.lines[0].to_char), (2, 1));
        assert_eq!((m.lines[1].from_run, m.lines[1].from_char), (2, 1));
    }

    #[test]
    fn trailing_break_adds_empty_line() {
        let block = para(
            vec![
                Run::text("ab", fmt10()),
                Run::LineBreak(LineBreakRun { formatting: fmt10() }),
            ],
            ParagraphAttrs::default(),
        );
        let m = measure(&block, 200.0);
        assert_eq!(m.lines.len(), 2);
        let last = &m.lines[1];
        assert_eq!((last.from_run, last.from_char), (last.to_run, last.to_char));
        assert!(last.line_height > 0.0);
        assert_eq!(compute_line_pm_range(&block, last), (4, 4));
        assert_eq!(compute_line_pm_range(&block, &m.lines[0]), (1, 4));
    }

    #[test]
    fn default_tab_interval_applies_without_stops() {
        let block = para(
            vec![
                Run::text("a", fmt10()),
                Run::Tab(TabRun { formatting: fmt10() }),
                Run::text("b", fmt10()),
            ],
            ParagraphAttrs::default(),
        );
        let m = measure(&block, 300.0);
        assert_eq!(m.lines.len(), 1);
        assert!((m.lines[0].offsets[2] - 36.0).abs() < 1e-3);
    }

    #[test]
    fn right_tab_aligns_following_segment() {
        let attrs = ParagraphAttrs {
            tab_stops: vec![TabStop {
                position: 100.0,
                alignment: TabAlignment::Right,
                leader: None,
            }],
            ..Default::default()
        };
        let block = para(
            vec![Run::Tab(TabRun { formatting: fmt10() }), Run::text("abc", fmt10())],
            attrs,
        );
        let m = measure(&block, 300.0);
        let line = &m.lines[0];
        assert!((line.offsets[4] - 100.0).abs() < 1e-3);
        assert!((line.width - 100.0).abs() < 1e-3);
    }

    #[test]
    fn exact_line_spacing_overrides_font_height() {
        let attrs = ParagraphAttrs {
            spacing: crate::model::Spacing {
                line: LineSpacing::Exact(30.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let block = para(vec![Run::text("x", fmt10())], attrs);
        let m = measure(&block, 100.0);
        assert_eq!(m.lines[0].line_height, 30.0);
    }

    #[test]
    fn first_line_indent_narrows_only_first_line() {
        let attrs = ParagraphAttrs {
            indent: crate::model::Indent {
                first_line: 20.0,
                ..Default::default()
            },
            ..Default::default()
        };
        // Each "aa" is 11.12pt plus a 2.78pt space.
        let block = para(vec![Run::text("aa aa aa", fmt10())], attrs);
        let m = measure(&block, 40.0);
        assert_eq!(m.lines.len(), 2);
        assert_eq!(m.lines[0].to_char, 3);
        assert_eq!(m.lines[1].from_char, 3);
    }
}
