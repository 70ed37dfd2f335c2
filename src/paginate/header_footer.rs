use serde::{Deserialize, Serialize};

use crate::LayoutOptions;
use crate::convert::{HeaderFooterBlocks, SectionHeaderFooterBlocks};
use crate::fonts::TextMeasurer;
use crate::measure::{Measure, measure_blocks, stacked_height};
use crate::model::{FlowBlock, SectionProperties};

/// A measured header or footer story.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterMeasure {
    pub blocks: Vec<FlowBlock>,
    pub measures: Vec<Measure>,
    pub total_height: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterMeasurements {
    pub default: Option<HeaderFooterMeasure>,
    pub first: Option<HeaderFooterMeasure>,
    pub even: Option<HeaderFooterMeasure>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHeaderFooterMeasure {
    pub header: HeaderFooterMeasurements,
    pub footer: HeaderFooterMeasurements,
}

/// Header/footer measurements for every section plus the document-wide
/// even/odd setting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterSet {
    pub sections: Vec<SectionHeaderFooterMeasure>,
    pub even_and_odd_headers: bool,
}

impl HeaderFooterSet {
    /// Section `index`, or the closest earlier section that has an entry.
    pub fn for_section(&self, index: usize) -> Option<&SectionHeaderFooterMeasure> {
        self.sections.get(index).or_else(|| self.sections.last())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderFooterVariant {
    Default,
    First,
    Even,
}

fn measure_story(blocks: &[FlowBlock], props: &SectionProperties, measurer: &dyn TextMeasurer, opts: &LayoutOptions) -> HeaderFooterMeasure {
    // Stories span the full content width regardless of body columns.
    let story_props = SectionProperties {
        columns: Default::default(),
        ..props.clone()
    };
    let measures = measure_blocks(blocks, &story_props, measurer, opts);
    let total_height = blocks
        .iter()
        .zip(&measures)
        .map(|(b, m)| stacked_height(b, m))
        .sum();
    HeaderFooterMeasure {
        blocks: blocks.to_vec(),
        measures,
        total_height,
    }
}

fn measure_variants(
    set: &HeaderFooterBlocks,
    props: &SectionProperties,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> HeaderFooterMeasurements {
    let measure = |blocks: &Option<Vec<FlowBlock>>| {
        blocks
            .as_deref()
            .map(|b| measure_story(b, props, measurer, opts))
    };
    HeaderFooterMeasurements {
        default: measure(&set.default),
        first: measure(&set.first),
        even: measure(&set.even),
    }
}

/// Measure every section's header and footer variants at that section's
/// content width.
pub fn measure_header_footers(
    sections: &[SectionHeaderFooterBlocks],
    even_and_odd_headers: bool,
    measurer: &dyn TextMeasurer,
    opts: &LayoutOptions,
) -> HeaderFooterSet {
    let sections = sections
        .iter()
        .map(|s| SectionHeaderFooterMeasure {
            header: measure_variants(&s.header, &s.properties, measurer, opts),
            footer: measure_variants(&s.footer, &s.properties, measurer, opts),
        })
        .collect();
    HeaderFooterSet {
        sections,
        even_and_odd_headers,
    }
}

/// Pick the variant shown on a page. A distinct first page wins over even/odd;
/// even pages use the even story when even/odd differ; everything else uses
/// the default story. A selected variant that has no story leaves the page
/// without a header (or footer).
pub fn get_header_footer_for_page(
    measurements: &HeaderFooterMeasurements,
    page_number: usize,
    is_first_page: bool,
    has_different_first: bool,
    has_different_even_odd: bool,
) -> Option<(HeaderFooterVariant, &HeaderFooterMeasure)> {
    let (variant, story) = if is_first_page && has_different_first {
        (HeaderFooterVariant::First, measurements.first.as_ref())
    } else if has_different_even_odd && page_number % 2 == 0 {
        (HeaderFooterVariant::Even, measurements.even.as_ref())
    } else {
        (HeaderFooterVariant::Default, measurements.default.as_ref())
    };
    story.map(|s| (variant, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(h: f32) -> Option<HeaderFooterMeasure> {
        Some(HeaderFooterMeasure {
            blocks: Vec::new(),
            measures: Vec::new(),
            total_height: h,
        })
    }

    fn all_variants() -> HeaderFooterMeasurements {
        HeaderFooterMeasurements {
            default: story(10.0),
            first: story(20.0),
            even: story(30.0),
        }
    }

    #[test]
    fn first_page_beats_even() {
        let m = all_variants();
        let (variant, s) = get_header_footer_for_page(&m, 2, true, true, true).unwrap();
        assert_eq!(variant, HeaderFooterVariant::First);
        assert_eq!(s.total_height, 20.0);
    }

    #[test]
    fn even_pages_use_even_story_only_when_enabled() {
        let m = all_variants();
        let even = get_header_footer_for_page(&m, 4, false, true, true).map(|(v, _)| v);
        assert_eq!(even, Some(HeaderFooterVariant::Even));
        let plain = get_header_footer_for_page(&m, 4, false, true, false).map(|(v, _)| v);
        assert_eq!(plain, Some(HeaderFooterVariant::Default));
        let odd = get_header_footer_for_page(&m, 3, false, true, true).map(|(v, _)| v);
        assert_eq!(odd, Some(HeaderFooterVariant::Default));
    }

    #[test]
    fn missing_first_story_leaves_page_blank() {
        let m = HeaderFooterMeasurements {
            default: story(10.0),
            ..Default::default()
        };
        assert!(get_header_footer_for_page(&m, 1, true, true, false).is_none());
        assert!(get_header_footer_for_page(&m, 1, true, false, false).is_some());
    }
}
