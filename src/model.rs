use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque block identifier, unique within one conversion pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Generation counter threaded explicitly through conversion so that converting
/// the same tree twice yields the same ids.
#[derive(Debug, Default)]
pub struct BlockIdGen {
    next: u32,
}

impl BlockIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BlockId {
        let id = BlockId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabAlignment {
    #[default]
    Left,
    Center,
    Right,
    Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStop {
    pub position: f32,
    #[serde(default)]
    pub alignment: TabAlignment,
    #[serde(default)]
    pub leader: Option<char>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "camelCase")]
pub enum LineSpacing {
    Auto(f32),    // multiplier (e.g. 1.0 = single, 1.15 = default)
    Exact(f32),   // fixed height in points
    AtLeast(f32), // minimum height in points
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing::Auto(1.0)
    }
}

impl LineSpacing {
    /// Line height for a run of `font_size` whose font has the given
    /// (ascent - descent + gap) / em ratio.
    pub fn resolve(self, font_size: f32, line_h_ratio: f32) -> f32 {
        let natural = font_size * line_h_ratio;
        match self {
            LineSpacing::Auto(mult) => natural * mult,
            LineSpacing::Exact(pts) => pts,
            LineSpacing::AtLeast(min_pts) => natural.max(min_pts),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Spacing {
    pub before: f32,
    pub after: f32,
    pub line: LineSpacing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Indent {
    pub left: f32,
    pub right: f32,
    pub first_line: f32,
    pub hanging: f32,
}

impl Indent {
    /// Offset of the first line's start relative to the other lines.
    pub fn first_line_offset(&self) -> f32 {
        self.first_line - self.hanging
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParagraphAttrs {
    pub alignment: Alignment,
    pub spacing: Spacing,
    pub indent: Indent,
    pub style_id: Option<String>,
    pub tab_stops: Vec<TabStop>,
    pub keep_lines: bool,
    pub keep_next: bool,
    pub widow_control: bool,
    pub page_break_before: bool,
}

impl Default for ParagraphAttrs {
    fn default() -> Self {
        Self {
            alignment: Alignment::Left,
            spacing: Spacing::default(),
            indent: Indent::default(),
            style_id: None,
            tab_stops: Vec::new(),
            keep_lines: false,
            keep_next: false,
            widow_control: true,
            page_break_before: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Page,
    NumPages,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunFormatting {
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub color: Option<[u8; 3]>, // None = automatic (black)
    pub highlight: Option<[u8; 3]>,
    pub field: Option<FieldKind>,
}

impl Default for RunFormatting {
    fn default() -> Self {
        Self {
            font_family: "Aptos".to_string(),
            font_size: 12.0,
            bold: false,
            italic: false,
            underline: false,
            strike: false,
            color: None,
            highlight: None,
            field: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub formatting: RunFormatting,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRun {
    #[serde(default)]
    pub formatting: RunFormatting,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBreakRun {
    #[serde(default)]
    pub formatting: RunFormatting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRun {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub src: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Run {
    Text(TextRun),
    Tab(TabRun),
    LineBreak(LineBreakRun),
    Image(ImageRun),
}

impl Run {
    pub fn text(text: impl Into<String>, formatting: RunFormatting) -> Self {
        Run::Text(TextRun {
            text: text.into(),
            formatting,
        })
    }

    /// Number of document positions the run occupies: one per character for
    /// text, one for every other kind.
    pub fn pm_size(&self) -> u32 {
        match self {
            Run::Text(t) => t.text.chars().count() as u32,
            _ => 1,
        }
    }

    pub fn formatting(&self) -> Option<&RunFormatting> {
        match self {
            Run::Text(t) => Some(&t.formatting),
            Run::Tab(t) => Some(&t.formatting),
            Run::LineBreak(b) => Some(&b.formatting),
            Run::Image(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphBlock {
    pub id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
    pub runs: Vec<Run>,
    #[serde(default)]
    pub attrs: ParagraphAttrs,
}

impl ParagraphBlock {
    /// Formatting used for empty lines: the first run that has one.
    pub fn default_formatting(&self) -> RunFormatting {
        self.runs
            .iter()
            .find_map(Run::formatting)
            .cloned()
            .unwrap_or_default()
    }

    /// Plain text of the paragraph, tabs as `\t`, breaks as `\n`, images as U+FFFC.
    pub fn text(&self) -> String {
        self.runs
            .iter()
            .map(|run| match run {
                Run::Text(t) => t.text.clone(),
                Run::Tab(_) => "\t".to_string(),
                Run::LineBreak(_) => "\n".to_string(),
                Run::Image(_) => "\u{FFFC}".to_string(),
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowHeightRule {
    AtLeast,
    Exact,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowHeight {
    pub value: f32,
    pub rule: RowHeightRule,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPadding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Default for CellPadding {
    fn default() -> Self {
        Self {
            top: 0.0,
            right: 5.4,
            bottom: 0.0,
            left: 5.4,
        }
    }
}

fn one() -> u16 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(default = "one")]
    pub col_span: u16,
    #[serde(default = "one")]
    pub row_span: u16,
    pub blocks: Vec<FlowBlock>,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub vertical_align: VerticalAlign,
    #[serde(default)]
    pub background: Option<[u8; 3]>,
    pub pm_start: u32,
    pub pm_end: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    #[serde(default)]
    pub height: Option<RowHeight>,
    pub pm_start: u32,
    pub pm_end: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableBlock {
    pub id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub column_widths: Vec<f32>,
    #[serde(default)]
    pub cell_padding: CellPadding,
    #[serde(default)]
    pub indent: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorRelativeTo {
    Page,
    Margin,
    Paragraph,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnchor {
    pub x: f32,
    pub y: f32,
    pub relative_to: AnchorRelativeTo,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
    pub id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
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
#[serde(rename_all = "camelCase")]
pub struct PageBreakBlock {
    pub id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionBreakType {
    #[default]
    NextPage,
    Continuous,
    OddPage,
    EvenPage,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        // US Letter
        Self {
            width: 612.0,
            height: 792.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMargins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
    pub header: f32,
    pub footer: f32,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            top: 72.0,
            right: 72.0,
            bottom: 72.0,
            left: 72.0,
            header: 36.0,
            footer: 36.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub count: u16,
    pub gap: f32,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            count: 1,
            gap: 36.0,
        }
    }
}

impl ColumnLayout {
    pub fn single() -> Self {
        Self::default()
    }

    fn effective_count(&self) -> u16 {
        self.count.max(1)
    }

    pub fn column_width(&self, content_width: f32) -> f32 {
        let n = self.effective_count() as f32;
        ((content_width - (n - 1.0) * self.gap) / n).max(1.0)
    }

    /// X offset of column `index` relative to the content box's left edge.
    pub fn column_x(&self, index: usize, content_width: f32) -> f32 {
        index as f32 * (self.column_width(content_width) + self.gap)
    }

    /// Same column structure; a single column ignores its gap.
    pub fn same_layout(&self, other: &ColumnLayout) -> bool {
        self.effective_count() == other.effective_count()
            && (self.effective_count() == 1 || (self.gap - other.gap).abs() < 0.01)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Geometry and flow rules of one document section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionProperties {
    pub break_type: SectionBreakType,
    pub page_size: PageSize,
    pub margins: PageMargins,
    pub columns: ColumnLayout,
    pub orientation: Orientation,
    pub title_page: bool,
}

impl SectionProperties {
    pub fn content_width(&self) -> f32 {
        (self.page_size.width - self.margins.left - self.margins.right).max(1.0)
    }

    pub fn column_width(&self) -> f32 {
        self.columns.column_width(self.content_width())
    }
}

/// A section break begins section `section_index`, whose properties it carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBreakBlock {
    pub id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
    pub section_index: usize,
    pub properties: SectionProperties,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlowBlock {
    Paragraph(ParagraphBlock),
    Table(TableBlock),
    Image(ImageBlock),
    PageBreak(PageBreakBlock),
    SectionBreak(SectionBreakBlock),
}

impl FlowBlock {
    pub fn id(&self) -> BlockId {
        match self {
            FlowBlock::Paragraph(b) => b.id,
            FlowBlock::Table(b) => b.id,
            FlowBlock::Image(b) => b.id,
            FlowBlock::PageBreak(b) => b.id,
            FlowBlock::SectionBreak(b) => b.id,
        }
    }

    pub fn pm_range(&self) -> (u32, u32) {
        match self {
            FlowBlock::Paragraph(b) => (b.pm_start, b.pm_end),
            FlowBlock::Table(b) => (b.pm_start, b.pm_end),
            FlowBlock::Image(b) => (b.pm_start, b.pm_end),
            FlowBlock::PageBreak(b) => (b.pm_start, b.pm_end),
            FlowBlock::SectionBreak(b) => (b.pm_start, b.pm_end),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FlowBlock::Paragraph(_) => "paragraph",
            FlowBlock::Table(_) => "table",
            FlowBlock::Image(_) => "image",
            FlowBlock::PageBreak(_) => "pageBreak",
            FlowBlock::SectionBreak(_) => "sectionBreak",
        }
    }
}
