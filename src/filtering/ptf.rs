//! Single threshold filtering.
use super::filter::{DocumentFilter, Filter, LineDecision};
use crate::error::Error;
use crate::types::CountInfoDocument;

/// Drops lines present in more than `k` documents.
///
/// Lines with a count of 0 (empty lines, lookup misses) are always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ptf {
    k: u32,
}

impl Ptf {
    pub fn new(k: i64) -> Result<Self, Error> {
        let k = u32::try_from(k).map_err(|_| {
            Error::InvalidPolicy(format!(
                "ptf threshold must be in 0..={} (got {})",
                u32::MAX,
                k
            ))
        })?;
        Ok(Self { k })
    }

    pub fn k(&self) -> u32 {
        self.k
    }
}

impl Filter<u32> for Ptf {
    #[inline]
    fn detect(&self, count: u32) -> bool {
        count <= self.k
    }
}

impl DocumentFilter for Ptf {
    fn decide(&self, doc: &CountInfoDocument) -> Vec<LineDecision> {
        doc.counts
            .iter()
            .map(|count| {
                if self.detect(*count) {
                    LineDecision::keep()
                } else {
                    LineDecision::drop()
                }
            })
            .collect()
    }
}
