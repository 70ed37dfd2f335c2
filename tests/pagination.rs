mod common;

use docxide_layout::doc::{DocCell, DocNode, HeaderFooterContent, Inline, SectionHeaderFooters};
use docxide_layout::fonts::FallbackMetrics;
use docxide_layout::measure::Measure;
use docxide_layout::model::{
    ColumnLayout, FlowBlock, PageMargins, ParagraphAttrs, RunFormatting, SectionBreakType, SectionProperties,
};
use docxide_layout::paginate::header_footer::HeaderFooterVariant;
use docxide_layout::paginate::section::SectionState;
use docxide_layout::paginate::{Fragment, paginate};
use docxide_layout::{LayoutOptions, layout_document};

use common::*;

#[test]
fn paragraph_fragments_cover_all_lines_in_page_order() {
    let d = doc(vec![para("intro"), lines_para(100), para("outro")]);
    let result = lay_out(&d);
    let long = &result.blocks[1];
    let total = match &result.measures[1] {
        Measure::Paragraph(m) => m.lines.len(),
        other => panic!("expected paragraph measure, got {:?}", other),
    };
    assert_eq!(total, 100);

    let spans = fragment_spans(&result.layout, long);
    assert!(spans.len() >= 3);
    let mut next_line = 0;
    let mut last_page = 0;
    for (page, from, to) in &spans {
        assert_eq!(*from, next_line);
        assert!(to > from);
        assert!(*page >= last_page);
        next_line = *to;
        last_page = *page;
    }
    assert_eq!(next_line, total);

    let flags: Vec<(bool, bool)> = result
        .layout
        .fragments_for(long.id())
        .map(|(_, f)| match f {
            Fragment::Paragraph(p) => (p.continues_from_prev, p.continues_on_next),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(flags.first(), Some(&(false, true)));
    assert_eq!(flags.last(), Some(&(true, false)));
}

#[test]
fn layout_is_idempotent() {
    let d = doc(vec![
        para(&words(200)),
        table(vec![row(vec![cell("a"), cell("b")], Some(30.0))], vec![]),
        lines_para(60),
    ]);
    let first = serde_json::to_string(&lay_out(&d)).unwrap();
    let second = serde_json::to_string(&lay_out(&d)).unwrap();
    assert_eq!(first, second);

    let result = lay_out(&d);
    let again = paginate(
        &result.blocks,
        &result.measures,
        SectionState::from_properties(&d.section),
        &result.header_footers,
        &LayoutOptions::default(),
    );
    assert_eq!(
        serde_json::to_string(&again).unwrap(),
        serde_json::to_string(&result.layout).unwrap()
    );
}

#[test]
fn next_page_margins_apply_from_the_new_page() {
    let wide_top = SectionProperties {
        margins: PageMargins {
            top: 144.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let d = doc(vec![
        para("first"),
        section_break(SectionBreakType::NextPage, wide_top),
        para("second"),
    ]);
    let result = lay_out(&d);
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].margins.top, 72.0);
    assert_eq!(pages[0].content_top, 72.0);
    assert_eq!(pages[1].margins.top, 144.0);
    assert_eq!(pages[1].content_top, 144.0);
    assert_eq!(pages[1].section_index, 1);

    let second = &result.blocks[2];
    let (page, fragment) = result.layout.fragments_for(second.id()).next().unwrap();
    assert_eq!(page, 1);
    assert_eq!(fragment.bounds().1, 144.0);
}

#[test]
fn table_splits_between_rows() {
    let d = doc(vec![table(
        vec![
            row(vec![cell("first row")], Some(400.0)),
            row(vec![cell("second row")], Some(400.0)),
        ],
        vec![],
    )]);
    let result = lay_out(&d);
    let spans = fragment_spans(&result.layout, &result.blocks[0]);
    assert_eq!(spans, vec![(0, 0, 1), (1, 1, 2)]);

    let continued: Vec<bool> = result
        .layout
        .fragments_for(result.blocks[0].id())
        .map(|(_, f)| match f {
            Fragment::Table(t) => t.continues_from_prev,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(continued, vec![false, true]);
}

#[test]
fn continuous_break_changing_columns_opens_a_region() {
    let two_columns = SectionProperties {
        columns: ColumnLayout { count: 2, gap: 20.0 },
        ..Default::default()
    };
    let d = doc(vec![
        para("single column"),
        section_break(SectionBreakType::Continuous, two_columns),
        para("left column"),
    ]);
    let result = lay_out(&d);
    assert_eq!(result.layout.pages.len(), 1);

    let page = &result.layout.pages[0];
    assert_eq!(page.regions.len(), 2);
    assert_eq!(page.regions[0].columns.count, 1);
    assert_eq!(page.regions[1].columns, ColumnLayout { count: 2, gap: 20.0 });
    assert!(approx(page.regions[1].top, 72.0 + LINE_HEIGHT));

    let (_, fragment) = result.layout.fragments_for(result.blocks[2].id()).next().unwrap();
    let (x, y, width, _) = fragment.bounds();
    assert_eq!(x, 72.0);
    assert!(approx(y, 72.0 + LINE_HEIGHT));
    assert!(approx(width, (468.0 - 20.0) / 2.0));
}

#[test]
fn odd_page_break_inserts_a_blank_page() {
    let d = doc(vec![
        para("page one"),
        section_break(SectionBreakType::OddPage, SectionProperties::default()),
        para("page three"),
    ]);
    let result = lay_out(&d);
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 3);
    assert!(pages[1].fragments.is_empty());
    assert_eq!(pages[2].number, 3);
    let (page, _) = result.layout.fragments_for(result.blocks[2].id()).next().unwrap();
    assert_eq!(page, 2);
}

#[test]
fn even_page_break_on_odd_page_needs_no_filler() {
    let d = doc(vec![
        para("page one"),
        section_break(SectionBreakType::EvenPage, SectionProperties::default()),
        para("page two"),
    ]);
    assert_eq!(lay_out(&d).layout.pages.len(), 2);
}

#[test]
fn page_break_starts_a_new_page() {
    let d = doc(vec![para("a"), DocNode::PageBreak, para("b")]);
    let result = lay_out(&d);
    assert_eq!(result.layout.pages.len(), 2);
    let (page, fragment) = result.layout.fragments_for(result.blocks[2].id()).next().unwrap();
    assert_eq!(page, 1);
    assert_eq!(fragment.bounds().1, 72.0);
}

#[test]
fn header_variants_first_even_default() {
    let story = |lines: usize| Some(vec![lines_para(lines)]);
    let mut d = doc(vec![lines_para(45), lines_para(45), lines_para(45)]);
    d.section.title_page = true;
    d.even_and_odd_headers = true;
    d.header_footers = vec![SectionHeaderFooters {
        header: HeaderFooterContent {
            default: story(1),
            first: story(4),
            even: story(2),
        },
        footer: HeaderFooterContent::default(),
    }];

    let result = lay_out(&d);
    let pages = &result.layout.pages;
    assert!(pages.len() >= 3);
    assert_eq!(pages[0].header, Some(HeaderFooterVariant::First));
    assert_eq!(pages[1].header, Some(HeaderFooterVariant::Even));
    assert_eq!(pages[2].header, Some(HeaderFooterVariant::Default));
    assert_eq!(pages[0].footer, None);

    // 36pt header margin + four 14.4pt lines pushes the body below the 72pt margin.
    assert!(approx(pages[0].content_top, 36.0 + 4.0 * LINE_HEIGHT));
    assert_eq!(pages[2].content_top, 72.0);
}

#[test]
fn keep_next_moves_paragraph_with_its_follower() {
    let keep = ParagraphAttrs {
        keep_next: true,
        ..Default::default()
    };
    let d = doc(vec![lines_para(44), para_with("Heading", keep), lines_para(2)]);
    let result = lay_out(&d);
    let (page, _) = result.layout.fragments_for(result.blocks[1].id()).next().unwrap();
    assert_eq!(page, 1);
}

#[test]
fn widow_control_refuses_a_lone_first_line() {
    let d = doc(vec![lines_para(44), lines_para(3)]);
    let result = lay_out(&d);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 3)]);
}

#[test]
fn row_span_height_counts_on_origin_row_only() {
    let tall = DocCell {
        row_span: 2,
        content: vec![lines_para(5)],
        ..Default::default()
    };
    let d = doc(vec![table(
        vec![row(vec![tall, cell("b")], None), row(vec![cell("c")], None)],
        vec![100.0, 100.0],
    )]);
    let result = lay_out(&d);
    let Measure::Table(m) = &result.measures[0] else {
        panic!("expected table measure");
    };
    assert!(approx(m.rows[0].height, 5.0 * LINE_HEIGHT));
    assert!(approx(m.rows[1].height, LINE_HEIGHT));
    assert_eq!(m.rows[1].cells[0].grid_column, 1);
    assert!(approx(m.total_height, 6.0 * LINE_HEIGHT));
}

#[test]
fn anchored_image_does_not_consume_flow() {
    use docxide_layout::doc::DocImage;
    use docxide_layout::model::{AnchorRelativeTo, ImageAnchor};

    let d = doc(vec![
        DocNode::Image(DocImage {
            width: 50.0,
            height: 50.0,
            alignment: Default::default(),
            anchor: Some(ImageAnchor {
                x: 10.0,
                y: 20.0,
                relative_to: AnchorRelativeTo::Page,
            }),
            src: None,
        }),
        para("text"),
    ]);
    let result = lay_out(&d);
    let fragments = &result.layout.pages[0].fragments;
    match &fragments[0] {
        Fragment::Image(img) => {
            assert!(img.anchored);
            assert_eq!((img.x, img.y), (10.0, 20.0));
        }
        other => panic!("expected image fragment, got {:?}", other),
    }
    assert_eq!(fragments[1].bounds().1, 72.0);
}

#[test]
fn blocks_in_json_document_lay_out_like_built_ones() {
    let json = r#"{
        "body": [
            {"type": "paragraph", "content": [{"type": "text", "text": "Hello"}]},
            {"type": "pageBreak"},
            {"type": "paragraph", "content": [{"type": "text", "text": "World"}]}
        ]
    }"#;
    let parsed: docxide_layout::doc::Document = serde_json::from_str(json).unwrap();
    let result = layout_document(&parsed, &FallbackMetrics, &LayoutOptions::default());
    assert_eq!(result.layout.pages.len(), 2);
    assert!(matches!(result.blocks[1], FlowBlock::PageBreak(_)));
}

fn narrow_margins() -> SectionProperties {
    SectionProperties {
        margins: PageMargins {
            left: 10.0,
            right: 10.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Widest measured line of each fragment of block `idx`, with the fragment's page and width.
fn line_fit(result: &docxide_layout::DocumentLayout, idx: usize) -> Vec<(usize, f32, f32)> {
    let Measure::Paragraph(m) = &result.measures[idx] else {
        panic!("expected paragraph measure");
    };
    result
        .layout
        .fragments_for(result.blocks[idx].id())
        .map(|(page, f)| match f {
            Fragment::Paragraph(p) => {
                let widest = m.lines[p.from_line..p.to_line]
                    .iter()
                    .map(|l| l.width)
                    .fold(0.0f32, f32::max);
                (page, widest, p.width)
            }
            _ => unreachable!(),
        })
        .collect()
}

#[test]
fn continuous_margin_change_does_not_widen_lines_on_the_current_page() {
    let d = doc(vec![
        para("before"),
        section_break(SectionBreakType::Continuous, narrow_margins()),
        para(&words(200)),
    ]);
    let result = lay_out(&d);
    let fits = line_fit(&result, 2);
    assert!(!fits.is_empty());
    for (page, widest, width) in fits {
        assert_eq!(page, 0);
        assert!(approx(width, 468.0));
        assert!(widest <= width + 0.01, "line {} wider than column {}", widest, width);
    }
}

#[test]
fn next_page_margin_change_measures_at_the_new_width() {
    let d = doc(vec![
        para("before"),
        section_break(SectionBreakType::NextPage, narrow_margins()),
        para(&words(200)),
    ]);
    let result = lay_out(&d);
    let fits = line_fit(&result, 2);
    for (page, widest, width) in &fits {
        assert_eq!(*page, 1);
        assert!(approx(*width, 592.0));
        assert!(*widest <= *width + 0.01);
    }
    assert!(fits.iter().any(|(_, widest, _)| *widest > 468.0));
}

#[test]
fn title_page_applies_to_a_section_started_by_a_continuous_break() {
    let story = |lines: usize| Some(vec![lines_para(lines)]);
    let title = SectionProperties {
        title_page: true,
        ..Default::default()
    };
    let mut d = doc(vec![
        para("intro"),
        section_break(SectionBreakType::Continuous, title),
        lines_para(60),
    ]);
    d.header_footers = vec![
        SectionHeaderFooters {
            header: HeaderFooterContent {
                default: story(1),
                ..Default::default()
            },
            ..Default::default()
        },
        SectionHeaderFooters {
            header: HeaderFooterContent {
                default: story(1),
                first: story(2),
                even: None,
            },
            ..Default::default()
        },
    ];

    let result = lay_out(&d);
    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].section_index, 0);
    assert_eq!(pages[0].header, Some(HeaderFooterVariant::Default));
    assert_eq!(pages[1].section_index, 1);
    assert_eq!(pages[1].header, Some(HeaderFooterVariant::First));
}

#[test]
fn keep_lines_moves_the_whole_paragraph() {
    let keep = ParagraphAttrs {
        keep_lines: true,
        ..Default::default()
    };
    let d = doc(vec![lines_para(40), with_attrs(lines_para(10), keep)]);
    let result = lay_out(&d);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 10)]);
}

#[test]
fn widow_control_carries_a_second_line_over() {
    // Five lines fit, which would leave one widow on the next page.
    let d = doc(vec![lines_para(40), lines_para(6)]);
    let result = lay_out(&d);
    assert_eq!(
        fragment_spans(&result.layout, &result.blocks[1]),
        vec![(0, 0, 4), (1, 4, 6)]
    );
}

#[test]
fn widow_control_moves_a_short_paragraph_whole() {
    // Two lines fit; carrying one over would leave a single line behind.
    let d = doc(vec![lines_para(43), lines_para(3)]);
    let result = lay_out(&d);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 3)]);
}

#[test]
fn page_break_before_starts_a_page_unless_already_at_top() {
    let before = ParagraphAttrs {
        page_break_before: true,
        ..Default::default()
    };
    let d = doc(vec![para("a"), para_with("b", before.clone())]);
    let result = lay_out(&d);
    assert_eq!(result.layout.pages.len(), 2);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 1)]);

    let at_top = doc(vec![para_with("b", before)]);
    assert_eq!(lay_out(&at_top).layout.pages.len(), 1);
}

#[test]
fn oversized_line_is_placed_on_a_fresh_page() {
    let huge = RunFormatting {
        font_size: 600.0,
        ..Default::default()
    };
    let d = doc(vec![
        para("a"),
        DocNode::paragraph(vec![Inline::text("X", huge)]),
        para("after"),
    ]);
    let result = lay_out(&d);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 1)]);
    let (_, fragment) = result.layout.fragments_for(result.blocks[1].id()).next().unwrap();
    assert!(fragment.bounds().3 > BODY_HEIGHT);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[2]), vec![(2, 0, 1)]);
}

#[test]
fn oversized_row_is_placed_on_a_fresh_page() {
    let d = doc(vec![
        para("a"),
        table(vec![row(vec![cell("tall")], Some(800.0))], vec![]),
        para("after"),
    ]);
    let result = lay_out(&d);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[1]), vec![(1, 0, 1)]);
    assert_eq!(fragment_spans(&result.layout, &result.blocks[2]), vec![(2, 0, 1)]);
}
