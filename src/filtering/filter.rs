//! Filtering traits.
use crate::filtering::Band;
use crate::types::CountInfoDocument;

/// immutable, pure filter (2 successive equal inputs -> 2 equal outputs)
pub trait Filter<T> {
    fn detect(&self, item: T) -> bool;
}

/// Decision taken for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDecision {
    pub keep: bool,
    /// band of the line's count, for banded policies.
    pub band: Option<Band>,
    /// whether the line is flagged in the filtered output.
    pub annotate: bool,
}

impl LineDecision {
    pub fn keep() -> Self {
        Self {
            keep: true,
            band: None,
            annotate: false,
        }
    }

    pub fn drop() -> Self {
        Self {
            keep: false,
            band: None,
            annotate: false,
        }
    }
}

/// Document level filter.
///
/// Lines are decided together since a decision can depend on neighbouring lines.
/// Returns one decision per line, in line order.
pub trait DocumentFilter {
    fn decide(&self, doc: &CountInfoDocument) -> Vec<LineDecision>;
}
