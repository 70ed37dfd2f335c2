use std::collections::HashMap;
use std::io::{Read, Seek};

use crate::model::{Alignment, Indent, LineSpacing, ParagraphAttrs, RunFormatting, TabStop};

use super::{
    DML_NS, WML_NS, highlight_color, parse_tab_stops, parse_text_color, read_zip_text, twips_attr,
    wml, wml_attr, wml_bool,
};

fn dml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children()
        .find(|n| n.tag_name().name() == name && n.tag_name().namespace() == Some(DML_NS))
}

fn latin_typeface<'a>(node: roxmltree::Node<'a, 'a>) -> Option<&'a str> {
    dml(node, "latin")
        .and_then(|n| n.attribute("typeface"))
        .filter(|tf| !tf.is_empty())
}

pub(super) struct ThemeFonts {
    pub(super) major: String,
    pub(super) minor: String,
}

/// Run properties as written on one level of the cascade; `None` inherits.
#[derive(Clone, Debug, Default)]
pub(super) struct RunProps {
    pub(super) font_family: Option<String>,
    pub(super) font_size: Option<f32>,
    pub(super) bold: Option<bool>,
    pub(super) italic: Option<bool>,
    pub(super) underline: Option<bool>,
    pub(super) strike: Option<bool>,
    pub(super) color: Option<Option<[u8; 3]>>,
    pub(super) highlight: Option<[u8; 3]>,
}

impl RunProps {
    pub(super) fn parse(rpr: roxmltree::Node, theme: &ThemeFonts) -> Self {
        RunProps {
            font_family: wml(rpr, "rFonts").and_then(|n| resolve_font_from_node(n, theme)),
            font_size: wml_attr(rpr, "sz")
                .and_then(|v| v.parse::<f32>().ok())
                .map(|hp| hp / 2.0),
            bold: wml_bool(rpr, "b"),
            italic: wml_bool(rpr, "i"),
            underline: wml_attr(rpr, "u").map(|v| v != "none"),
            strike: wml_bool(rpr, "strike"),
            color: wml_attr(rpr, "color").map(parse_text_color),
            highlight: wml_attr(rpr, "highlight").and_then(highlight_color),
        }
    }

    /// Layer `over` on top of `self`.
    pub(super) fn merge(&mut self, over: &RunProps) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if over.$field.is_some() {
                    self.$field = over.$field.clone();
                })*
            };
        }
        take!(font_family, font_size, bold, italic, underline, strike, color, highlight);
    }

    pub(super) fn apply(&self, fmt: &mut RunFormatting) {
        if let Some(f) = &self.font_family {
            fmt.font_family = f.clone();
        }
        if let Some(sz) = self.font_size {
            fmt.font_size = sz;
        }
        if let Some(b) = self.bold {
            fmt.bold = b;
        }
        if let Some(i) = self.italic {
            fmt.italic = i;
        }
        if let Some(u) = self.underline {
            fmt.underline = u;
        }
        if let Some(s) = self.strike {
            fmt.strike = s;
        }
        if let Some(c) = self.color {
            fmt.color = c;
        }
        if let Some(h) = self.highlight {
            fmt.highlight = Some(h);
        }
    }
}

/// Paragraph properties as written on one level of the cascade.
#[derive(Clone, Debug, Default)]
pub(super) struct ParagraphProps {
    pub(super) alignment: Option<Alignment>,
    pub(super) space_before: Option<f32>,
    pub(super) space_after: Option<f32>,
    pub(super) line_spacing: Option<LineSpacing>,
    pub(super) indent_left: Option<f32>,
    pub(super) indent_right: Option<f32>,
    pub(super) first_line: Option<f32>,
    pub(super) hanging: Option<f32>,
    pub(super) keep_next: Option<bool>,
    pub(super) keep_lines: Option<bool>,
    pub(super) widow_control: Option<bool>,
    pub(super) page_break_before: Option<bool>,
    pub(super) tab_stops: Option<Vec<TabStop>>,
}

impl ParagraphProps {
    pub(super) fn parse(ppr: roxmltree::Node) -> Self {
        let spacing = wml(ppr, "spacing");
        let ind = wml(ppr, "ind");
        let ind_attr = |a: &str, b: &str| ind.and_then(|n| twips_attr(n, a).or_else(|| twips_attr(n, b)));
        ParagraphProps {
            alignment: wml_attr(ppr, "jc").map(parse_alignment),
            space_before: spacing.and_then(|n| twips_attr(n, "before")),
            space_after: spacing.and_then(|n| twips_attr(n, "after")),
            line_spacing: spacing.and_then(parse_line_spacing),
            indent_left: ind_attr("left", "start"),
            indent_right: ind_attr("right", "end"),
            first_line: ind.and_then(|n| twips_attr(n, "firstLine")),
            hanging: ind.and_then(|n| twips_attr(n, "hanging")),
            keep_next: wml_bool(ppr, "keepNext"),
            keep_lines: wml_bool(ppr, "keepLines"),
            widow_control: wml_bool(ppr, "widowControl"),
            page_break_before: wml_bool(ppr, "pageBreakBefore"),
            tab_stops: wml(ppr, "tabs").map(|_| parse_tab_stops(ppr)),
        }
    }

    pub(super) fn merge(&mut self, over: &ParagraphProps) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if over.$field.is_some() {
                    self.$field = over.$field.clone();
                })*
            };
        }
        take!(
            alignment,
            space_before,
            space_after,
            line_spacing,
            indent_left,
            indent_right,
            first_line,
            hanging,
            keep_next,
            keep_lines,
            widow_control,
            page_break_before,
            tab_stops
        );
    }

    pub(super) fn to_attrs(&self, style_id: Option<&str>) -> ParagraphAttrs {
        let defaults = ParagraphAttrs::default();
        ParagraphAttrs {
            alignment: self.alignment.unwrap_or(defaults.alignment),
            spacing: crate::model::Spacing {
                before: self.space_before.unwrap_or(0.0),
                after: self.space_after.unwrap_or(0.0),
                line: self.line_spacing.unwrap_or_default(),
            },
            indent: Indent {
                left: self.indent_left.unwrap_or(0.0),
                right: self.indent_right.unwrap_or(0.0),
                first_line: self.first_line.unwrap_or(0.0),
                hanging: self.hanging.unwrap_or(0.0),
            },
            style_id: style_id.map(str::to_string),
            tab_stops: self.tab_stops.clone().unwrap_or_default(),
            keep_lines: self.keep_lines.unwrap_or(false),
            keep_next: self.keep_next.unwrap_or(false),
            widow_control: self.widow_control.unwrap_or(defaults.widow_control),
            page_break_before: self.page_break_before.unwrap_or(false),
        }
    }
}

struct RawStyle {
    para: ParagraphProps,
    run: RunProps,
    based_on: Option<String>,
}

/// A style with its `basedOn` chain already folded in.
#[derive(Clone, Debug, Default)]
pub(super) struct ResolvedStyle {
    pub(super) para: ParagraphProps,
    pub(super) run: RunProps,
}

pub(super) struct StylesInfo {
    pub(super) default_run: RunFormatting,
    pub(super) default_para: ParagraphProps,
    pub(super) default_paragraph_style: Option<String>,
    pub(super) paragraph_styles: HashMap<String, ResolvedStyle>,
    pub(super) character_styles: HashMap<String, RunProps>,
}

impl StylesInfo {
    fn fallback(theme: &ThemeFonts) -> Self {
        StylesInfo {
            default_run: RunFormatting {
                font_family: theme.minor.clone(),
                ..Default::default()
            },
            default_para: ParagraphProps::default(),
            default_paragraph_style: None,
            paragraph_styles: HashMap::new(),
            character_styles: HashMap::new(),
        }
    }

    /// Paragraph properties and base run formatting for `style_id` (or the
    /// document's default paragraph style).
    pub(super) fn paragraph_base(&self, style_id: Option<&str>) -> (ParagraphProps, RunFormatting) {
        let mut para = self.default_para.clone();
        let mut fmt = self.default_run.clone();
        let id = style_id.or(self.default_paragraph_style.as_deref());
        if let Some(style) = id.and_then(|id| self.paragraph_styles.get(id)) {
            para.merge(&style.para);
            style.run.apply(&mut fmt);
        }
        (para, fmt)
    }
}

pub(super) fn parse_alignment(val: &str) -> Alignment {
    match val {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

/// `w:spacing/@w:line` with its `lineRule`: auto lines are in 240ths of a
/// line, exact and at-least lines in twips.
pub(super) fn parse_line_spacing(spacing: roxmltree::Node) -> Option<LineSpacing> {
    let line = spacing
        .attribute((WML_NS, "line"))
        .and_then(|v| v.parse::<f32>().ok())?;
    Some(match spacing.attribute((WML_NS, "lineRule")) {
        Some("exact") => LineSpacing::Exact(line / 20.0),
        Some("atLeast") => LineSpacing::AtLeast(line / 20.0),
        _ => LineSpacing::Auto(line / 240.0),
    })
}

pub(super) fn parse_theme<R: Read + Seek>(zip: &mut zip::ZipArchive<R>) -> ThemeFonts {
    let mut major = String::from("Aptos Display");
    let mut minor = String::from("Aptos");

    let theme_name = zip
        .file_names()
        .find(|n| n.starts_with("word/theme/") && n.ends_with(".xml"))
        .map(str::to_string);
    let Some(xml_content) = theme_name.and_then(|name| read_zip_text(zip, &name)) else {
        return ThemeFonts { major, minor };
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        return ThemeFonts { major, minor };
    };

    for node in xml.descendants() {
        if node.tag_name().namespace() != Some(DML_NS) {
            continue;
        }
        match node.tag_name().name() {
            "majorFont" => {
                if let Some(tf) = latin_typeface(node) {
                    major = tf.to_string();
                }
            }
            "minorFont" => {
                if let Some(tf) = latin_typeface(node) {
                    minor = tf.to_string();
                }
            }
            _ => {}
        }
    }

    ThemeFonts { major, minor }
}

pub(super) fn resolve_font_from_node(rfonts: roxmltree::Node, theme: &ThemeFonts) -> Option<String> {
    if let Some(f) = rfonts.attribute((WML_NS, "ascii")) {
        return Some(f.to_string());
    }
    match rfonts.attribute((WML_NS, "asciiTheme")) {
        Some("majorHAnsi") | Some("majorAscii") => Some(theme.major.clone()),
        Some("minorHAnsi") | Some("minorAscii") => Some(theme.minor.clone()),
        _ => None,
    }
}

pub(super) fn parse_styles<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, theme: &ThemeFonts) -> StylesInfo {
    let mut info = StylesInfo::fallback(theme);

    let Some(xml_content) = read_zip_text(zip, "word/styles.xml") else {
        return info;
    };
    let Ok(xml) = roxmltree::Document::parse(&xml_content) else {
        log::warn!("word/styles.xml is not well-formed; using default styles");
        return info;
    };
    let root = xml.root_element();

    if let Some(doc_defaults) = wml(root, "docDefaults") {
        if let Some(rpr) = wml(doc_defaults, "rPrDefault").and_then(|n| wml(n, "rPr")) {
            RunProps::parse(rpr, theme).apply(&mut info.default_run);
        }
        if let Some(ppr) = wml(doc_defaults, "pPrDefault").and_then(|n| wml(n, "pPr")) {
            info.default_para = ParagraphProps::parse(ppr);
        }
    }

    let mut raw_paragraph: HashMap<String, RawStyle> = HashMap::new();
    let mut raw_character: HashMap<String, RawStyle> = HashMap::new();

    for style_node in root.children() {
        if style_node.tag_name().name() != "style" || style_node.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        let Some(style_id) = style_node.attribute((WML_NS, "styleId")) else {
            continue;
        };
        let raw = RawStyle {
            para: wml(style_node, "pPr").map(ParagraphProps::parse).unwrap_or_default(),
            run: wml(style_node, "rPr")
                .map(|rpr| RunProps::parse(rpr, theme))
                .unwrap_or_default(),
            based_on: wml_attr(style_node, "basedOn").map(str::to_string),
        };
        match style_node.attribute((WML_NS, "type")) {
            Some("paragraph") => {
                let is_default = style_node
                    .attribute((WML_NS, "default"))
                    .is_some_and(|v| v == "1" || v == "true");
                if is_default {
                    info.default_paragraph_style = Some(style_id.to_string());
                }
                raw_paragraph.insert(style_id.to_string(), raw);
            }
            Some("character") => {
                raw_character.insert(style_id.to_string(), raw);
            }
            _ => {}
        }
    }

    info.paragraph_styles = raw_paragraph
        .keys()
        .map(|id| (id.clone(), resolve_based_on(id, &raw_paragraph)))
        .collect();
    info.character_styles = raw_character
        .keys()
        .map(|id| (id.clone(), resolve_based_on(id, &raw_character).run))
        .collect();

    log::debug!(
        "styles: {} paragraph, {} character, default={:?}",
        info.paragraph_styles.len(),
        info.character_styles.len(),
        info.default_paragraph_style
    );
    info
}

/// Fold the `basedOn` chain of `id`, furthest ancestor first. Cycles stop the walk.
fn resolve_based_on(id: &str, styles: &HashMap<String, RawStyle>) -> ResolvedStyle {
    let mut chain: Vec<&str> = Vec::new();
    let mut current = Some(id);
    while let Some(cur) = current {
        if chain.contains(&cur) {
            break;
        }
        chain.push(cur);
        current = styles.get(cur).and_then(|s| s.based_on.as_deref());
    }

    let mut resolved = ResolvedStyle::default();
    for ancestor in chain.iter().rev() {
        if let Some(s) = styles.get(*ancestor) {
            resolved.para.merge(&s.para);
            resolved.run.merge(&s.run);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(size: Option<f32>, bold: Option<bool>, based_on: Option<&str>) -> RawStyle {
        RawStyle {
            para: ParagraphProps::default(),
            run: RunProps {
                font_size: size,
                bold,
                ..Default::default()
            },
            based_on: based_on.map(str::to_string),
        }
    }

    #[test]
    fn based_on_chain_inherits_and_overrides() {
        let mut styles = HashMap::new();
        styles.insert("Normal".to_string(), raw(Some(11.0), Some(false), None));
        styles.insert("Heading1".to_string(), raw(Some(16.0), Some(true), Some("Normal")));
        styles.insert("Title".to_string(), raw(None, None, Some("Heading1")));

        let title = resolve_based_on("Title", &styles);
        assert_eq!(title.run.font_size, Some(16.0));
        assert_eq!(title.run.bold, Some(true));
    }

    #[test]
    fn cyclic_based_on_terminates() {
        let mut styles = HashMap::new();
        styles.insert("A".to_string(), raw(Some(10.0), None, Some("B")));
        styles.insert("B".to_string(), raw(Some(20.0), None, Some("A")));
        assert_eq!(resolve_based_on("A", &styles).run.font_size, Some(10.0));
    }

    #[test]
    fn line_rules() {
        let xml = format!(
            r#"<w:p xmlns:w="{WML_NS}"><w:spacing w:line="360" w:lineRule="auto"/><w:spacing w:line="300" w:lineRule="exact"/></w:p>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let nodes: Vec<_> = doc.root_element().children().collect();
        assert_eq!(parse_line_spacing(nodes[0]), Some(LineSpacing::Auto(1.5)));
        assert_eq!(parse_line_spacing(nodes[1]), Some(LineSpacing::Exact(15.0)));
    }
}
