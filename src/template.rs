//! `{{name}}` template variables: detection over flow blocks and substitution
//! in the editable tree.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::doc::{DocNode, Document, HeaderFooterContent, Inline};
use crate::model::{BlockId, FlowBlock, ParagraphBlock, Run, RunFormatting};

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("BUG: invalid VARIABLE_RE regex literal")
});

/// Stands in for tabs, breaks and images so that matches never cross them.
const OBJECT_CHAR: char = '\u{FFFC}';

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    pub name: String,
    pub block_id: BlockId,
    pub pm_start: u32,
    pub pm_end: u32,
}

fn scan_paragraph(p: &ParagraphBlock, out: &mut Vec<TemplateVariable>) {
    let text: String = p
        .runs
        .iter()
        .map(|run| match run {
            Run::Text(t) => t.text.clone(),
            _ => OBJECT_CHAR.to_string(),
        })
        .collect();

    for caps in VARIABLE_RE.captures_iter(&text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let start = text[..whole.start()].chars().count() as u32;
        let len = whole.as_str().chars().count() as u32;
        out.push(TemplateVariable {
            name: name.as_str().to_string(),
            block_id: p.id,
            pm_start: p.pm_start + start,
            pm_end: p.pm_start + start + len,
        });
    }
}

fn scan_blocks(blocks: &[FlowBlock], out: &mut Vec<TemplateVariable>) {
    for block in blocks {
        match block {
            FlowBlock::Paragraph(p) => scan_paragraph(p, out),
            FlowBlock::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| &r.cells) {
                    scan_blocks(&cell.blocks, out);
                }
            }
            _ => {}
        }
    }
}

/// Every `{{name}}` occurrence in document order, including inside tables.
/// A variable may span runs with different formatting.
pub fn find_template_variables(blocks: &[FlowBlock]) -> Vec<TemplateVariable> {
    let mut out = Vec::new();
    scan_blocks(blocks, &mut out);
    out
}

/// Replace text inside one paragraph's content. Each replacement takes the
/// formatting of the character where its match starts; untouched text keeps
/// its own formatting. Unknown names are left as written.
fn substitute_inlines(content: &mut Vec<Inline>, values: &HashMap<String, String>) -> usize {
    // Per-char (char, formatting) for text; objects are kept aside by index.
    let mut chars: Vec<(char, Option<RunFormatting>)> = Vec::new();
    let mut objects: Vec<Inline> = Vec::new();
    for inline in content.iter() {
        match inline {
            Inline::Text { text, marks } => chars.extend(text.chars().map(|c| (c, Some(marks.clone())))),
            other => {
                chars.push((OBJECT_CHAR, None));
                objects.push(other.clone());
            }
        }
    }
    let text: String = chars.iter().map(|(c, _)| *c).collect();

    let mut replaced = 0usize;
    let mut out: Vec<(char, Option<RunFormatting>)> = Vec::with_capacity(chars.len());
    let mut char_idx = 0usize;
    let mut byte_idx = 0usize;
    for caps in VARIABLE_RE.captures_iter(&text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(value) = values.get(name.as_str()) else {
            continue;
        };
        let start = char_idx + text[byte_idx..whole.start()].chars().count();
        let end = start + whole.as_str().chars().count();
        out.extend(chars[char_idx..start].iter().cloned());
        let marks = chars[start].1.clone();
        out.extend(value.chars().map(|c| (c, marks.clone())));
        char_idx = end;
        byte_idx = whole.end();
        replaced += 1;
    }
    if replaced == 0 {
        return 0;
    }
    out.extend(chars[char_idx..].iter().cloned());

    let mut objects = objects.into_iter();
    let mut rebuilt: Vec<Inline> = Vec::new();
    for (c, marks) in out {
        match marks {
            None => rebuilt.extend(objects.next()),
            Some(marks) => {
                let same = matches!(rebuilt.last(), Some(Inline::Text { marks: last, .. }) if *last == marks);
                if !same {
                    rebuilt.push(Inline::Text {
                        text: String::new(),
                        marks,
                    });
                }
                if let Some(Inline::Text { text, .. }) = rebuilt.last_mut() {
                    text.push(c);
                }
            }
        }
    }
    *content = rebuilt;
    replaced
}

fn substitute_nodes(nodes: &mut [DocNode], values: &HashMap<String, String>) -> usize {
    nodes
        .iter_mut()
        .map(|node| match node {
            DocNode::Paragraph(p) => substitute_inlines(&mut p.content, values),
            DocNode::Table(t) => t
                .rows
                .iter_mut()
                .flat_map(|r| r.cells.iter_mut())
                .map(|cell| substitute_nodes(&mut cell.content, values))
                .sum(),
            _ => 0,
        })
        .sum()
}

fn substitute_story(content: &mut HeaderFooterContent, values: &HashMap<String, String>) -> usize {
    [&mut content.default, &mut content.first, &mut content.even]
        .into_iter()
        .flatten()
        .map(|nodes| substitute_nodes(nodes, values))
        .sum()
}

/// Substitute known variables throughout the body and header/footer stories.
/// Returns the number of replacements made.
pub fn substitute_variables(doc: &mut Document, values: &HashMap<String, String>) -> usize {
    let mut replaced = substitute_nodes(&mut doc.body, values);
    for hf in &mut doc.header_footers {
        replaced += substitute_story(&mut hf.header, values);
        replaced += substitute_story(&mut hf.footer, values);
    }
    log::debug!("template: {} substitutions", replaced);
    replaced
}

/// Parse `name=value` pairs (as given on the command line).
pub fn parse_assignments<'a>(pairs: impl IntoIterator<Item = &'a str>) -> HashMap<String, String> {
    pairs
        .into_iter()
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.to_string()))
        })
        .collect()
}
