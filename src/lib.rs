pub mod bridge;
pub mod convert;
pub mod doc;
pub mod docx;
mod error;
pub mod fonts;
pub mod measure;
pub mod model;
pub mod paginate;
pub mod paint;
pub mod template;

pub use error::Error;

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::convert::convert_document;
use crate::doc::Document;
use crate::fonts::TextMeasurer;
use crate::measure::{Measure, measure_blocks};
use crate::model::{BlockIdGen, FlowBlock};
use crate::paginate::header_footer::{HeaderFooterSet, measure_header_footers};
use crate::paginate::section::SectionState;
use crate::paginate::{Layout, paginate};

/// Knobs shared by measurement and pagination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Vertical gap between stacked pages in the multi-page container.
    pub page_gap: f32,
    /// Default tab interval when a paragraph has no explicit stop past the pen.
    pub default_tab_interval: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            page_gap: 24.0,
            default_tab_interval: 36.0,
        }
    }
}

/// Everything a renderer needs: the flow blocks, their measures (1:1), the
/// paginated layout and the measured header/footer stories.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLayout {
    pub blocks: Vec<FlowBlock>,
    pub measures: Vec<Measure>,
    pub layout: Layout,
    pub header_footers: HeaderFooterSet,
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Convert, measure and paginate a document tree.
pub fn layout_document(doc: &Document, measurer: &dyn TextMeasurer, opts: &LayoutOptions) -> DocumentLayout {
    let t0 = Instant::now();

    let mut ids = BlockIdGen::new();
    let converted = convert_document(doc, &mut ids);
    let t_convert = t0.elapsed();

    let measures = measure_blocks(&converted.blocks, &converted.initial_section, measurer, opts);
    let t_measure = t0.elapsed();

    let header_footers = measure_header_footers(
        &converted.header_footers,
        converted.even_and_odd_headers,
        measurer,
        opts,
    );
    let t_header_footer = t0.elapsed();

    let layout = paginate(
        &converted.blocks,
        &measures,
        SectionState::from_properties(&converted.initial_section),
        &header_footers,
        opts,
    );
    let t_total = t0.elapsed();

    log::info!(
        "Timing: convert={:.1}ms, measure={:.1}ms, header/footer={:.1}ms, paginate={:.1}ms, total={:.1}ms ({} blocks, {} pages)",
        ms(t_convert),
        ms(t_measure - t_convert),
        ms(t_header_footer - t_measure),
        ms(t_total - t_header_footer),
        ms(t_total),
        converted.blocks.len(),
        layout.pages.len(),
    );

    DocumentLayout {
        blocks: converted.blocks,
        measures,
        layout,
        header_footers,
    }
}

/// Read a document tree from a `.docx` package or a JSON file.
pub fn load_document(input: &Path) -> Result<Document, Error> {
    let t0 = Instant::now();
    let is_json = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let doc = if is_json {
        let text = std::fs::read_to_string(input)?;
        serde_json::from_str(&text)?
    } else {
        docx::parse(input)?
    };
    log::info!(
        "Timing: load={:.1}ms ({} top-level nodes)",
        ms(t0.elapsed()),
        doc.body.len()
    );
    Ok(doc)
}
