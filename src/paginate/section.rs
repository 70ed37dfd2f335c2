//! Section-break state machine.
//!
//! Every geometry field is a [`Scheduled`] pair: the value in force on the
//! current page and the value waiting for the next page boundary. Section
//! breaks only ever write the scheduled side, except for a continuous break
//! that changes columns, which takes effect immediately as a new region.

use serde::{Deserialize, Serialize};

use crate::model::{
    ColumnLayout, Orientation, PageMargins, PageSize, SectionBreakBlock, SectionBreakType,
    SectionProperties,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled<T> {
    pub applied: T,
    pub scheduled: Option<T>,
}

impl<T: Clone + PartialEq> Scheduled<T> {
    pub fn new(value: T) -> Self {
        Self {
            applied: value,
            scheduled: None,
        }
    }

    /// Overwrites any earlier scheduled value.
    pub fn schedule(&mut self, value: T) {
        self.scheduled = Some(value);
    }

    pub fn apply_now(&mut self, value: T) {
        self.applied = value;
        self.scheduled = None;
    }

    /// Promote the scheduled value. Returns true when the applied value changed.
    pub fn promote(&mut self) -> bool {
        match self.scheduled.take() {
            Some(value) if value != self.applied => {
                self.applied = value;
                true
            }
            _ => false,
        }
    }

    /// The value the next page will use.
    pub fn upcoming(&self) -> &T {
        self.scheduled.as_ref().unwrap_or(&self.applied)
    }
}

/// Which section a page belongs to and whether that section has a distinct
/// first-page header/footer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionIdentity {
    pub index: usize,
    pub title_page: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionState {
    pub page_size: Scheduled<PageSize>,
    pub margins: Scheduled<PageMargins>,
    pub orientation: Scheduled<Orientation>,
    pub columns: Scheduled<ColumnLayout>,
    pub section: Scheduled<SectionIdentity>,
}

impl SectionState {
    /// State for the first section of a document.
    pub fn from_properties(props: &SectionProperties) -> Self {
        Self {
            page_size: Scheduled::new(props.page_size),
            margins: Scheduled::new(props.margins),
            orientation: Scheduled::new(props.orientation),
            columns: Scheduled::new(props.columns),
            section: Scheduled::new(SectionIdentity {
                index: 0,
                title_page: props.title_page,
            }),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.page_size.scheduled.is_some()
            || self.margins.scheduled.is_some()
            || self.orientation.scheduled.is_some()
            || self.columns.scheduled.is_some()
            || self.section.scheduled.is_some()
    }

    /// Width between the applied left and right margins.
    pub fn content_width(&self) -> f32 {
        (self.page_size.applied.width - self.margins.applied.left - self.margins.applied.right).max(1.0)
    }

    /// Width of one column under the applied geometry.
    pub fn column_width(&self) -> f32 {
        self.columns.applied.column_width(self.content_width())
    }
}

impl Default for SectionState {
    fn default() -> Self {
        Self::from_properties(&SectionProperties::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageParity {
    Even,
    Odd,
}

impl PageParity {
    pub fn matches(self, page_number: usize) -> bool {
        match self {
            PageParity::Even => page_number % 2 == 0,
            PageParity::Odd => page_number % 2 == 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BreakDecision {
    /// Close the page; the next one must have the given parity.
    NewPage { parity: Option<PageParity> },
    /// Open a new column band below the content placed so far.
    NewRegion { columns: ColumnLayout },
    Nothing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionTransition {
    pub decision: BreakDecision,
    pub state: SectionState,
}

/// Decide what a section break does to the flow and compute the state after it.
/// Pure: `state` is left untouched.
pub fn schedule_section_break(block: &SectionBreakBlock, state: &SectionState) -> SectionTransition {
    let props = &block.properties;
    let mut next = state.clone();

    next.page_size.schedule(props.page_size);
    next.margins.schedule(props.margins);
    next.orientation.schedule(props.orientation);
    next.section.schedule(SectionIdentity {
        index: block.section_index,
        title_page: props.title_page,
    });

    let decision = match props.break_type {
        SectionBreakType::NextPage => BreakDecision::NewPage { parity: None },
        SectionBreakType::EvenPage => BreakDecision::NewPage {
            parity: Some(PageParity::Even),
        },
        SectionBreakType::OddPage => BreakDecision::NewPage {
            parity: Some(PageParity::Odd),
        },
        SectionBreakType::Continuous if !props.columns.same_layout(&state.columns.applied) => {
            next.columns.apply_now(props.columns);
            BreakDecision::NewRegion {
                columns: props.columns,
            }
        }
        SectionBreakType::Continuous => BreakDecision::Nothing,
    };
    if !matches!(decision, BreakDecision::NewRegion { .. }) {
        next.columns.schedule(props.columns);
    }

    log::debug!(
        "section break {} → section {}: {:?}",
        block.id,
        block.section_index,
        decision
    );

    SectionTransition {
        decision,
        state: next,
    }
}

/// Promote every scheduled field. Called when a new page starts.
pub fn apply_pending_to_active(state: &mut SectionState) {
    let mut changed = Vec::new();
    if state.page_size.promote() {
        changed.push("pageSize");
    }
    if state.margins.promote() {
        changed.push("margins");
    }
    if state.orientation.promote() {
        changed.push("orientation");
    }
    if state.columns.promote() {
        changed.push("columns");
    }
    if state.section.promote() {
        changed.push("section");
    }
    if !changed.is_empty() {
        log::debug!("page start applies pending {}", changed.join(", "));
    }
}
