mod common;

use docxide_layout::doc::{DocNode, HeaderFooterContent, Inline, SectionHeaderFooters};
use docxide_layout::model::RunFormatting;
use docxide_layout::template::{find_template_variables, parse_assignments, substitute_variables};

use common::*;

fn italic() -> RunFormatting {
    RunFormatting {
        italic: true,
        ..Default::default()
    }
}

#[test]
fn variables_are_found_across_runs_and_in_tables() {
    let d = doc(vec![
        DocNode::paragraph(vec![
            Inline::text("Dear {{first", fmt()),
            Inline::text("_name}},", italic()),
        ]),
        table(vec![row(vec![cell("Total: {{ amount }}")], None)], vec![]),
    ]);
    let r = lay_out(&d);
    let vars = find_template_variables(&r.blocks);
    let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["first_name", "amount"]);

    // "Dear " is five positions into a paragraph starting at 1.
    assert_eq!(vars[0].pm_start, 6);
    assert_eq!(vars[0].pm_end, 6 + "{{first_name}}".len() as u32);
    assert_eq!(vars[0].block_id, r.blocks[0].id());
}

#[test]
fn breaks_and_tabs_split_candidates() {
    let d = doc(vec![DocNode::paragraph(vec![
        text("{{a"),
        Inline::HardBreak { marks: fmt() },
        text("}} and {{b}}"),
    ])]);
    let r = lay_out(&d);
    let vars = find_template_variables(&r.blocks);
    assert_eq!(vars.len(), 1);
    assert_eq!(vars[0].name, "b");
}

#[test]
fn substitution_reaches_body_tables_and_headers() {
    let mut d = doc(vec![
        para("Hello {{name}}!"),
        table(vec![row(vec![cell("{{name}} / {{other}}")], None)], vec![]),
    ]);
    d.header_footers = vec![SectionHeaderFooters {
        header: HeaderFooterContent {
            default: Some(vec![para("Prepared for {{name}}")]),
            ..Default::default()
        },
        ..Default::default()
    }];

    let values = parse_assignments(["name=Grace", "ignored"]);
    assert_eq!(values.len(), 1);
    assert_eq!(substitute_variables(&mut d, &values), 3);

    let r = lay_out(&d);
    let texts: Vec<String> = paragraphs(&r.blocks).map(|p| p.text()).collect();
    assert_eq!(texts, vec!["Hello Grace!"]);

    let remaining = find_template_variables(&r.blocks);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "other");

    let DocNode::Paragraph(header) = &d.header_footers[0].header.default.as_ref().unwrap()[0] else {
        panic!("expected header paragraph");
    };
    assert_eq!(header.content, vec![text("Prepared for Grace")]);
}

#[test]
fn replacement_takes_formatting_of_match_start() {
    let mut d = doc(vec![DocNode::paragraph(vec![
        Inline::text("{{na", italic()),
        Inline::text("me}} rest", fmt()),
    ])]);
    let values = parse_assignments(["name=Ada"]);
    assert_eq!(substitute_variables(&mut d, &values), 1);
    let DocNode::Paragraph(p) = &d.body[0] else {
        unreachable!()
    };
    assert_eq!(
        p.content,
        vec![Inline::text("Ada", italic()), Inline::text(" rest", fmt())]
    );
}
