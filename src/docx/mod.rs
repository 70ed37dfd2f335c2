//! DOCX → editable document tree.
//!
//! Reads `word/document.xml`, styles, theme fonts, settings and the
//! header/footer parts a section references. The style cascade covers doc
//! defaults, paragraph styles (with `basedOn`), character styles and direct
//! formatting. Section properties are attached to the section break that
//! begins each section; the body-level `w:sectPr` is the last section.

mod styles;

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use crate::doc::{
    DocCell, DocImage, DocNode, DocParagraph, DocRow, DocTable, Document, HeaderFooterContent,
    Inline, SectionHeaderFooters,
};
use crate::error::Error;
use crate::model::{
    AnchorRelativeTo, CellPadding, ColumnLayout, FieldKind, ImageAnchor, Orientation, PageMargins,
    PageSize, RowHeight, RowHeightRule, RunFormatting, SectionBreakType, SectionProperties,
    TabAlignment, TabStop, VerticalAlign,
};

use styles::{ParagraphProps, RunProps, StylesInfo, ThemeFonts, parse_styles, parse_theme};

pub(super) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(super) const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const EMU_PER_PT: f32 = 12700.0;

pub(super) fn twips_to_pts(twips: f32) -> f32 {
    twips / 20.0
}

pub(super) fn parse_hex_color(val: &str) -> Option<[u8; 3]> {
    if val == "auto" || val.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&val[0..2], 16).ok()?;
    let g = u8::from_str_radix(&val[2..4], 16).ok()?;
    let b = u8::from_str_radix(&val[4..6], 16).ok()?;
    Some([r, g, b])
}

/// `None` is automatic color.
pub(super) fn parse_text_color(val: &str) -> Option<[u8; 3]> {
    parse_hex_color(val)
}

pub(super) fn highlight_color(name: &str) -> Option<[u8; 3]> {
    match name {
        "yellow" => Some([255, 255, 0]),
        "green" => Some([0, 255, 0]),
        "cyan" => Some([0, 255, 255]),
        "magenta" => Some([255, 0, 255]),
        "red" => Some([255, 0, 0]),
        "blue" => Some([0, 0, 255]),
        "darkYellow" => Some([128, 128, 0]),
        "darkGreen" => Some([0, 128, 0]),
        "darkCyan" => Some([0, 128, 128]),
        "darkMagenta" => Some([128, 0, 128]),
        "darkRed" => Some([128, 0, 0]),
        "darkBlue" => Some([0, 0, 128]),
        "lightGray" => Some([192, 192, 192]),
        "darkGray" => Some([128, 128, 128]),
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        _ => None,
    }
}

/// Parse a WML boolean toggle element (e.g., w:b, w:i, w:strike).
/// Present with no val or val != "0"/"false" means true.
pub(super) fn wml_bool(parent: roxmltree::Node, name: &str) -> Option<bool> {
    wml(parent, name).map(|n| {
        n.attribute((WML_NS, "val"))
            .is_none_or(|v| v != "0" && v != "false")
    })
}

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WML_NS))
}

pub(super) fn wml_attr<'a>(node: roxmltree::Node<'a, 'a>, child: &str) -> Option<&'a str> {
    wml(node, child).and_then(|n| n.attribute((WML_NS, "val")))
}

pub(super) fn twips_attr(node: roxmltree::Node, attr: &str) -> Option<f32> {
    node.attribute((WML_NS, attr))
        .and_then(|v| v.parse::<f32>().ok())
        .map(twips_to_pts)
}

fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.tag_name().name() == name && node.tag_name().namespace() == Some(WML_NS)
}

fn wpd<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(WPD_NS))
}

pub(super) fn parse_tab_stops(ppr: roxmltree::Node) -> Vec<TabStop> {
    let Some(tabs) = wml(ppr, "tabs") else {
        return vec![];
    };
    let mut stops: Vec<TabStop> = tabs
        .children()
        .filter(|n| is_wml(*n, "tab"))
        .filter_map(|n| {
            let pos = twips_attr(n, "pos")?;
            let val = n.attribute((WML_NS, "val")).unwrap_or("left");
            if val == "clear" {
                return None;
            }
            let alignment = match val {
                "center" => TabAlignment::Center,
                "right" | "end" => TabAlignment::Right,
                "decimal" => TabAlignment::Decimal,
                _ => TabAlignment::Left,
            };
            let leader = n.attribute((WML_NS, "leader")).and_then(|l| match l {
                "dot" => Some('.'),
                "hyphen" => Some('-'),
                "underscore" => Some('_'),
                _ => None,
            });
            Some(TabStop {
                position: pos,
                alignment,
                leader,
            })
        })
        .collect();
    stops.sort_by(|a, b| a.position.total_cmp(&b.position));
    stops
}

/// Flatten SDT wrappers: descend into w:sdtContent and collect effective children.
fn collect_block_nodes<'a>(parent: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        if is_wml(child, "sdt") {
            if let Some(content) = wml(child, "sdtContent") {
                nodes.extend(collect_block_nodes(content));
            }
        } else if child.is_element() {
            nodes.push(child);
        }
    }
    nodes
}

pub(super) fn read_zip_text<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut content = String::new();
    zip.by_name(name).ok()?.read_to_string(&mut content).ok()?;
    Some(content)
}

fn parse_rels_xml(xml_content: &str) -> HashMap<String, String> {
    let mut rels = HashMap::new();
    let Ok(xml) = roxmltree::Document::parse(xml_content) else {
        return rels;
    };
    for node in xml.root_element().children() {
        if node.tag_name().name() == "Relationship"
            && let (Some(id), Some(target)) = (node.attribute("Id"), node.attribute("Target"))
        {
            rels.insert(id.to_string(), target.to_string());
        }
    }
    rels
}

/// Load relationships for a part like "word/header1.xml" → "word/_rels/header1.xml.rels"
fn parse_part_relationships<R: Read + Seek>(
    zip: &mut zip::ZipArchive<R>,
    part_path: &str,
) -> HashMap<String, String> {
    let (dir, file) = part_path.rsplit_once('/').unwrap_or(("", part_path));
    let rels_path = if dir.is_empty() {
        format!("_rels/{}.rels", file)
    } else {
        format!("{}/_rels/{}.rels", dir, file)
    };
    let Some(xml_content) = read_zip_text(zip, &rels_path) else {
        return HashMap::new();
    };
    parse_rels_xml(&xml_content)
}

/// Zip entry a relationship target points to, relative to the `word/` folder.
fn part_path(target: &str) -> String {
    target
        .strip_prefix('/')
        .map(String::from)
        .unwrap_or_else(|| format!("word/{}", target))
}

/// Everything paragraph parsing needs from the part being read.
struct PartContext<'a> {
    styles: &'a StylesInfo,
    theme: &'a ThemeFonts,
    rels: &'a HashMap<String, String>,
}

fn push_text(content: &mut Vec<Inline>, text: &str, marks: &RunFormatting) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text { text: last, marks: last_marks }) = content.last_mut()
        && last_marks == marks
    {
        last.push_str(text);
        return;
    }
    content.push(Inline::text(text, marks.clone()));
}

fn field_kind(instr: &str) -> Option<FieldKind> {
    match instr.split_whitespace().next()? {
        w if w.eq_ignore_ascii_case("PAGE") => Some(FieldKind::Page),
        w if w.eq_ignore_ascii_case("NUMPAGES") => Some(FieldKind::NumPages),
        _ => None,
    }
}

/// Collected runs of one paragraph. A page break closes the current piece;
/// the importer emits each piece as its own paragraph with a page break between.
struct ParagraphContent {
    pieces: Vec<Vec<Inline>>,
    current: Vec<Inline>,
    floating: Vec<DocImage>,
}

#[derive(Clone, Copy, PartialEq)]
enum FieldState {
    Outside,
    Instruction,
    Result(Option<FieldKind>),
}

struct RunWalker<'c, 'a> {
    ctx: &'c PartContext<'a>,
    base: RunFormatting,
    out: ParagraphContent,
    field: FieldState,
    instr: String,
    field_text: String,
    field_marks: Option<RunFormatting>,
}

impl<'c, 'a> RunWalker<'c, 'a> {
    fn new(ctx: &'c PartContext<'a>, base: RunFormatting) -> Self {
        RunWalker {
            ctx,
            base,
            out: ParagraphContent {
                pieces: Vec::new(),
                current: Vec::new(),
                floating: Vec::new(),
            },
            field: FieldState::Outside,
            instr: String::new(),
            field_text: String::new(),
            field_marks: None,
        }
    }

    fn run_formatting(&self, run: roxmltree::Node) -> RunFormatting {
        let mut fmt = self.base.clone();
        let rpr = wml(run, "rPr");
        if let Some(cs) = rpr
            .and_then(|n| wml_attr(n, "rStyle"))
            .and_then(|id| self.ctx.styles.character_styles.get(id))
        {
            cs.apply(&mut fmt);
        }
        if let Some(rpr) = rpr {
            RunProps::parse(rpr, self.ctx.theme).apply(&mut fmt);
        }
        fmt
    }

    fn walk(&mut self, parent: roxmltree::Node) {
        for child in parent.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match child.tag_name().name() {
                "r" => self.run(child),
                "hyperlink" | "smartTag" | "ins" => self.walk(child),
                "sdt" => {
                    if let Some(content) = wml(child, "sdtContent") {
                        self.walk(content);
                    }
                }
                "fldSimple" => self.simple_field(child),
                _ => {}
            }
        }
    }

    fn simple_field(&mut self, node: roxmltree::Node) {
        let Some(kind) = node.attribute((WML_NS, "instr")).and_then(field_kind) else {
            self.walk(node);
            return;
        };
        let first_run = node.children().find(|n| is_wml(*n, "r"));
        let mut marks = first_run.map(|r| self.run_formatting(r)).unwrap_or_else(|| self.base.clone());
        marks.field = Some(kind);
        let cached: String = node
            .descendants()
            .filter(|n| is_wml(*n, "t"))
            .filter_map(|n| n.text())
            .collect();
        let text = if cached.is_empty() { "1" } else { cached.as_str() };
        self.out.current.push(Inline::text(text, marks));
    }

    fn run(&mut self, run: roxmltree::Node) {
        let marks = self.run_formatting(run);
        for child in run.children() {
            if child.tag_name().namespace() != Some(WML_NS) {
                continue;
            }
            match (child.tag_name().name(), self.field) {
                ("fldChar", _) => self.field_char(child),
                ("instrText", FieldState::Instruction) => {
                    if let Some(t) = child.text() {
                        self.instr.push_str(t);
                    }
                }
                ("t", FieldState::Result(Some(_))) => {
                    if let Some(t) = child.text() {
                        self.field_text.push_str(t);
                    }
                    self.field_marks.get_or_insert_with(|| marks.clone());
                }
                (_, FieldState::Instruction) => {}
                (_, FieldState::Result(Some(_))) => {}
                ("t", _) => {
                    if let Some(t) = child.text() {
                        // newlines inside w:t are whitespace; only w:br breaks lines
                        push_text(&mut self.out.current, &t.replace('\n', " "), &marks);
                    }
                }
                ("noBreakHyphen", _) => push_text(&mut self.out.current, "\u{2011}", &marks),
                ("tab", _) => self.out.current.push(Inline::Tab { marks: marks.clone() }),
                ("cr", _) => self.out.current.push(Inline::HardBreak { marks: marks.clone() }),
                ("br", _) => match child.attribute((WML_NS, "type")) {
                    Some("page") => {
                        let piece = std::mem::take(&mut self.out.current);
                        self.out.pieces.push(piece);
                    }
                    Some("column") => log::debug!("column break ignored"),
                    _ => self.out.current.push(Inline::HardBreak { marks: marks.clone() }),
                },
                ("drawing", _) => self.drawing(child),
                _ => {}
            }
        }
    }

    fn field_char(&mut self, node: roxmltree::Node) {
        match node.attribute((WML_NS, "fldCharType")) {
            Some("begin") => {
                self.field = FieldState::Instruction;
                self.instr.clear();
                self.field_text.clear();
                self.field_marks = None;
            }
            Some("separate") => {
                self.field = FieldState::Result(field_kind(&self.instr));
            }
            Some("end") => {
                let kind = match self.field {
                    FieldState::Result(kind) => kind,
                    FieldState::Instruction => field_kind(&self.instr),
                    FieldState::Outside => None,
                };
                if let Some(kind) = kind {
                    let mut marks = self.field_marks.take().unwrap_or_else(|| self.base.clone());
                    marks.field = Some(kind);
                    let text = if self.field_text.is_empty() { "1" } else { self.field_text.as_str() };
                    self.out.current.push(Inline::text(text, marks));
                }
                self.field = FieldState::Outside;
            }
            _ => {}
        }
    }

    fn drawing(&mut self, drawing: roxmltree::Node) {
        for container in drawing.children() {
            let name = container.tag_name().name();
            if (name != "inline" && name != "anchor") || container.tag_name().namespace() != Some(WPD_NS) {
                continue;
            }
            let extent = |attr: &str| {
                wpd(container, "extent")
                    .and_then(|n| n.attribute(attr))
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(0.0)
                    / EMU_PER_PT
            };
            let (width, height) = (extent("cx"), extent("cy"));
            let src = find_blip_embed(container)
                .and_then(|rid| self.ctx.rels.get(rid))
                .map(|target| part_path(target));

            if name == "anchor" && wpd(container, "wrapNone").is_some() {
                self.out.floating.push(DocImage {
                    width,
                    height,
                    alignment: Default::default(),
                    anchor: Some(parse_anchor(container)),
                    src,
                });
            } else {
                self.out.current.push(Inline::Image { width, height, src });
            }
            return;
        }
    }

    fn finish(mut self) -> ParagraphContent {
        let last = std::mem::take(&mut self.out.current);
        self.out.pieces.push(last);
        self.out
    }
}

fn find_blip_embed<'a>(container: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    container
        .descendants()
        .find(|n| n.tag_name().name() == "blip" && n.tag_name().namespace() == Some(DML_NS))
        .and_then(|n| n.attribute((REL_NS, "embed")))
}

fn pos_offset(pos: Option<roxmltree::Node>) -> f32 {
    pos.and_then(|p| wpd(p, "posOffset"))
        .and_then(|n| n.text())
        .and_then(|t| t.trim().parse::<f32>().ok())
        .map(|emu| emu / EMU_PER_PT)
        .unwrap_or(0.0)
}

/// Floating-image anchor. The vertical reference decides the frame; offsets
/// given as alignment keywords collapse to zero.
fn parse_anchor(container: roxmltree::Node) -> ImageAnchor {
    let pos_h = wpd(container, "positionH");
    let pos_v = wpd(container, "positionV");
    let relative_to = match pos_v.and_then(|n| n.attribute("relativeFrom")) {
        Some("page") => AnchorRelativeTo::Page,
        Some("margin") | Some("topMargin") => AnchorRelativeTo::Margin,
        _ => AnchorRelativeTo::Paragraph,
    };
    ImageAnchor {
        x: pos_offset(pos_h),
        y: pos_offset(pos_v),
        relative_to,
    }
}

fn parse_paragraph(p: roxmltree::Node, ctx: &PartContext, out: &mut Vec<DocNode>) {
    let ppr = wml(p, "pPr");
    let style_id = ppr.and_then(|n| wml_attr(n, "pStyle"));
    let (mut props, base) = ctx.styles.paragraph_base(style_id);
    if let Some(ppr) = ppr {
        props.merge(&ParagraphProps::parse(ppr));
    }
    let attrs = props.to_attrs(style_id);

    let mut mark = base.clone();
    if let Some(rpr) = ppr.and_then(|n| wml(n, "rPr")) {
        RunProps::parse(rpr, ctx.theme).apply(&mut mark);
    }

    let mut walker = RunWalker::new(ctx, base);
    walker.walk(p);
    let content = walker.finish();

    out.extend(content.floating.into_iter().map(DocNode::Image));

    let piece_count = content.pieces.len();
    for (i, piece) in content.pieces.into_iter().enumerate() {
        if i > 0 {
            out.push(DocNode::PageBreak);
        }
        // A paragraph that starts with a page break has no content before it.
        if i == 0 && piece.is_empty() && piece_count > 1 {
            continue;
        }
        let mut attrs = attrs.clone();
        if i > 0 {
            attrs.page_break_before = false;
        }
        out.push(DocNode::Paragraph(DocParagraph {
            attrs,
            mark: Some(mark.clone()),
            content: piece,
        }));
    }
}

fn cell_margin(mar: roxmltree::Node, names: &[&str], default: f32) -> f32 {
    names
        .iter()
        .find_map(|name| wml(mar, name))
        .and_then(|n| twips_attr(n, "w"))
        .unwrap_or(default)
}

struct RawCell {
    grid_col: usize,
    v_merge: Option<bool>, // Some(true) = restart, Some(false) = continue
    cell: DocCell,
}

fn parse_table(tbl: roxmltree::Node, ctx: &PartContext) -> DocTable {
    let column_widths: Vec<f32> = wml(tbl, "tblGrid")
        .into_iter()
        .flat_map(|grid| grid.children())
        .filter(|n| is_wml(*n, "gridCol"))
        .filter_map(|n| twips_attr(n, "w"))
        .collect();

    let tbl_pr = wml(tbl, "tblPr");
    let indent = tbl_pr
        .and_then(|pr| wml(pr, "tblInd"))
        .and_then(|ind| twips_attr(ind, "w"))
        .unwrap_or(0.0);
    let defaults = CellPadding::default();
    let cell_padding = tbl_pr
        .and_then(|pr| wml(pr, "tblCellMar"))
        .map(|mar| CellPadding {
            top: cell_margin(mar, &["top"], defaults.top),
            right: cell_margin(mar, &["right", "end"], defaults.right),
            bottom: cell_margin(mar, &["bottom"], defaults.bottom),
            left: cell_margin(mar, &["left", "start"], defaults.left),
        })
        .unwrap_or_default();

    let mut rows: Vec<DocRow> = Vec::new();
    // Grid column → (row, cell) of the restart cell a vertical merge extends.
    let mut open_merges: HashMap<usize, (usize, usize)> = HashMap::new();

    for tr in collect_block_nodes(tbl).into_iter().filter(|n| is_wml(*n, "tr")) {
        let height = wml(tr, "trPr")
            .and_then(|pr| wml(pr, "trHeight"))
            .and_then(|h| {
                let value = twips_attr(h, "val")?;
                let rule = match h.attribute((WML_NS, "hRule")) {
                    Some("exact") => RowHeightRule::Exact,
                    Some("auto") => return None,
                    _ => RowHeightRule::AtLeast,
                };
                Some(RowHeight { value, rule })
            });

        let mut raw_cells = Vec::new();
        let mut grid_col = 0usize;
        for tc in collect_block_nodes(tr).into_iter().filter(|n| is_wml(*n, "tc")) {
            let raw = parse_cell(tc, grid_col, ctx);
            grid_col += raw.cell.col_span.max(1) as usize;
            raw_cells.push(raw);
        }

        let row_index = rows.len();
        let mut row = DocRow {
            cells: Vec::with_capacity(raw_cells.len()),
            height,
        };
        for raw in raw_cells {
            match raw.v_merge {
                Some(false) => {
                    if let Some(&(r, c)) = open_merges.get(&raw.grid_col)
                        && let Some(origin) = rows.get_mut(r).and_then(|row| row.cells.get_mut(c))
                    {
                        origin.row_span += 1;
                        continue;
                    }
                    log::debug!("vMerge continue without a restart at column {}", raw.grid_col);
                    row.cells.push(raw.cell);
                }
                Some(true) => {
                    open_merges.insert(raw.grid_col, (row_index, row.cells.len()));
                    row.cells.push(raw.cell);
                }
                None => {
                    open_merges.remove(&raw.grid_col);
                    row.cells.push(raw.cell);
                }
            }
        }
        rows.push(row);
    }

    DocTable {
        rows,
        column_widths,
        cell_padding,
        indent,
    }
}

fn parse_cell(tc: roxmltree::Node, grid_col: usize, ctx: &PartContext) -> RawCell {
    let tc_pr = wml(tc, "tcPr");

    let width = tc_pr
        .and_then(|pr| wml(pr, "tcW"))
        .filter(|w| w.attribute((WML_NS, "type")).is_none_or(|t| t == "dxa"))
        .and_then(|w| twips_attr(w, "w"))
        .filter(|w| *w > 0.0);
    let col_span = tc_pr
        .and_then(|pr| wml_attr(pr, "gridSpan"))
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(1)
        .max(1);
    let v_merge = tc_pr
        .and_then(|pr| wml(pr, "vMerge"))
        .map(|n| n.attribute((WML_NS, "val")) == Some("restart"));
    let vertical_align = match tc_pr.and_then(|pr| wml_attr(pr, "vAlign")) {
        Some("center") => VerticalAlign::Center,
        Some("bottom") => VerticalAlign::Bottom,
        _ => VerticalAlign::Top,
    };
    let background = tc_pr
        .and_then(|pr| wml(pr, "shd"))
        .and_then(|shd| shd.attribute((WML_NS, "fill")))
        .and_then(parse_hex_color);

    let mut content = Vec::new();
    parse_blocks(tc, ctx, &mut content);

    RawCell {
        grid_col,
        v_merge,
        cell: DocCell {
            col_span,
            row_span: 1,
            width,
            vertical_align,
            background,
            content,
        },
    }
}

/// Paragraphs and tables of a cell or header/footer story.
fn parse_blocks(parent: roxmltree::Node, ctx: &PartContext, out: &mut Vec<DocNode>) {
    for node in collect_block_nodes(parent) {
        if is_wml(node, "p") {
            parse_paragraph(node, ctx, out);
        } else if is_wml(node, "tbl") {
            out.push(DocNode::Table(parse_table(node, ctx)));
        }
    }
}

fn parse_section_properties(sect: roxmltree::Node) -> SectionProperties {
    let pg_sz = wml(sect, "pgSz");
    let pg_mar = wml(sect, "pgMar");
    let defaults = SectionProperties::default();

    let page_size = PageSize {
        width: pg_sz
            .and_then(|n| twips_attr(n, "w"))
            .unwrap_or(defaults.page_size.width),
        height: pg_sz
            .and_then(|n| twips_attr(n, "h"))
            .unwrap_or(defaults.page_size.height),
    };
    let orientation = match pg_sz.and_then(|n| n.attribute((WML_NS, "orient"))) {
        Some("landscape") => Orientation::Landscape,
        _ => Orientation::Portrait,
    };
    let dm = defaults.margins;
    let mar = |attr: &str, default: f32| pg_mar.and_then(|n| twips_attr(n, attr)).unwrap_or(default);
    let margins = PageMargins {
        top: mar("top", dm.top),
        right: mar("right", dm.right),
        bottom: mar("bottom", dm.bottom),
        left: mar("left", dm.left),
        header: mar("header", dm.header),
        footer: mar("footer", dm.footer),
    };

    let columns = wml(sect, "cols")
        .map(|cols| ColumnLayout {
            count: cols
                .attribute((WML_NS, "num"))
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(1)
                .max(1),
            gap: twips_attr(cols, "space").unwrap_or(ColumnLayout::default().gap),
        })
        .unwrap_or_default();

    let break_type = match wml_attr(sect, "type") {
        Some("continuous") => SectionBreakType::Continuous,
        Some("oddPage") => SectionBreakType::OddPage,
        Some("evenPage") => SectionBreakType::EvenPage,
        _ => SectionBreakType::NextPage,
    };

    SectionProperties {
        break_type,
        page_size,
        margins,
        columns,
        orientation,
        title_page: wml_bool(sect, "titlePg").unwrap_or(false),
    }
}

fn parse_story<R: Read + Seek>(
    zip: &mut zip::ZipArchive<R>,
    target: &str,
    styles: &StylesInfo,
    theme: &ThemeFonts,
) -> Option<Vec<DocNode>> {
    let path = part_path(target);
    let rels = parse_part_relationships(zip, &path);
    let xml_text = read_zip_text(zip, &path)?;
    let xml = match roxmltree::Document::parse(&xml_text) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("skipping {}: {}", path, e);
            return None;
        }
    };
    let ctx = PartContext {
        styles,
        theme,
        rels: &rels,
    };
    let mut nodes = Vec::new();
    parse_blocks(xml.root_element(), &ctx, &mut nodes);
    Some(nodes)
}

/// Header/footer stories of one section. Variants the section does not
/// reference are inherited from the previous section.
fn parse_section_stories<R: Read + Seek>(
    sect: roxmltree::Node,
    previous: Option<&SectionHeaderFooters>,
    zip: &mut zip::ZipArchive<R>,
    rels: &HashMap<String, String>,
    styles: &StylesInfo,
    theme: &ThemeFonts,
) -> SectionHeaderFooters {
    let mut stories = previous.cloned().unwrap_or_default();
    for child in sect.children() {
        let is_header = is_wml(child, "headerReference");
        if !is_header && !is_wml(child, "footerReference") {
            continue;
        }
        let Some(target) = child.attribute((REL_NS, "id")).and_then(|rid| rels.get(rid)) else {
            continue;
        };
        let content: &mut HeaderFooterContent = if is_header {
            &mut stories.header
        } else {
            &mut stories.footer
        };
        let slot = match child.attribute((WML_NS, "type")) {
            Some("first") => &mut content.first,
            Some("even") => &mut content.even,
            _ => &mut content.default,
        };
        *slot = parse_story(zip, target, styles, theme);
    }
    stories
}

fn parse_settings<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> bool {
    let Some(xml_content) = read_zip_text(zip, "word/settings.xml") else {
        return false;
    };
    roxmltree::Document::parse(&xml_content)
        .ok()
        .and_then(|xml| wml_bool(xml.root_element(), "evenAndOddHeaders"))
        .unwrap_or(false)
}

pub fn parse(path: &Path) -> Result<Document, Error> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => Error::Io(
            std::io::Error::new(e.kind(), format!("{}: {}", e, path.display())),
        ),
        _ => Error::Io(e),
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|_| Error::InvalidDocx("file is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}

pub fn parse_bytes(data: &[u8]) -> Result<Document, Error> {
    let mut zip = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|_| Error::InvalidDocx("data is not a ZIP archive".into()))?;
    parse_archive(&mut zip)
}

fn parse_archive<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> Result<Document, Error> {
    let theme = parse_theme(zip);
    let styles = parse_styles(zip, &theme);
    let rels = read_zip_text(zip, "word/_rels/document.xml.rels")
        .map(|xml| parse_rels_xml(&xml))
        .unwrap_or_default();
    let even_and_odd_headers = parse_settings(zip);

    let xml_content = read_zip_text(zip, "word/document.xml").ok_or_else(|| {
        Error::InvalidDocx("missing word/document.xml (is this a DOCX file?)".into())
    })?;
    let xml = roxmltree::Document::parse(&xml_content)?;
    let body = wml(xml.root_element(), "body")
        .ok_or_else(|| Error::InvalidDocx("missing w:body".into()))?;

    let ctx = PartContext {
        styles: &styles,
        theme: &theme,
        rels: &rels,
    };

    let mut nodes = Vec::new();
    let mut section_nodes = Vec::new();
    // Indices in `nodes` of the section-break placeholders, in order.
    let mut break_slots = Vec::new();
    for node in collect_block_nodes(body) {
        if is_wml(node, "p") {
            parse_paragraph(node, &ctx, &mut nodes);
            if let Some(sect) = wml(node, "pPr").and_then(|ppr| wml(ppr, "sectPr")) {
                section_nodes.push(sect);
                break_slots.push(nodes.len());
                nodes.push(DocNode::SectionBreak {
                    properties: SectionProperties::default(),
                });
            }
        } else if is_wml(node, "tbl") {
            nodes.push(DocNode::Table(parse_table(node, &ctx)));
        } else if is_wml(node, "sectPr") {
            section_nodes.push(node);
        }
    }

    let mut sections: Vec<SectionProperties> =
        section_nodes.iter().map(|s| parse_section_properties(*s)).collect();
    // The trailing section break, when the body has no final sectPr, begins a
    // section with default properties.
    while sections.len() < break_slots.len() + 1 {
        sections.push(SectionProperties::default());
    }

    let mut header_footers: Vec<SectionHeaderFooters> = Vec::with_capacity(sections.len());
    for sect in &section_nodes {
        let stories = parse_section_stories(*sect, header_footers.last(), zip, &rels, &styles, &theme);
        header_footers.push(stories);
    }

    for (i, slot) in break_slots.iter().enumerate() {
        if let Some(DocNode::SectionBreak { properties }) = nodes.get_mut(*slot) {
            *properties = sections[i + 1].clone();
        }
    }

    log::debug!(
        "docx: {} body nodes, {} sections, even/odd headers={}",
        nodes.len(),
        sections.len(),
        even_and_odd_headers
    );

    Ok(Document {
        section: sections.into_iter().next().unwrap_or_default(),
        body: nodes,
        header_footers,
        even_and_odd_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_xml<T>(body: &str, f: impl FnOnce(roxmltree::Node) -> T) -> T {
        let xml = format!(r#"<w:root xmlns:w="{WML_NS}">{body}</w:root>"#);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        f(doc.root_element())
    }

    #[test]
    fn section_properties_in_points() {
        let props = parse_xml(
            r#"<w:sectPr><w:type w:val="continuous"/><w:pgSz w:w="12240" w:h="15840" w:orient="portrait"/><w:pgMar w:top="2880" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720"/><w:cols w:num="2" w:space="360"/><w:titlePg/></w:sectPr>"#,
            |root| parse_section_properties(wml(root, "sectPr").unwrap()),
        );
        assert_eq!(props.break_type, SectionBreakType::Continuous);
        assert_eq!(props.margins.top, 144.0);
        assert_eq!(props.page_size.width, 612.0);
        assert_eq!(props.columns.count, 2);
        assert_eq!(props.columns.gap, 18.0);
        assert!(props.title_page);
    }

    #[test]
    fn field_instructions() {
        assert_eq!(field_kind(" PAGE  \\* MERGEFORMAT "), Some(FieldKind::Page));
        assert_eq!(field_kind("NUMPAGES"), Some(FieldKind::NumPages));
        assert_eq!(field_kind("TOC \\o"), None);
    }

    #[test]
    fn adjacent_runs_with_same_marks_merge() {
        let mut content = Vec::new();
        let fmt = RunFormatting::default();
        push_text(&mut content, "ab", &fmt);
        push_text(&mut content, "cd", &fmt);
        assert_eq!(content, vec![Inline::text("abcd", fmt)]);
    }
}
