//! K-way merge of sorted `(key, count)` sequences.
//!
//! Keys present in several sources are emitted once, with their counts summed.
//! Used to merge hasher spills and partials alike.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::Error;
use crate::io::artifact::Entry;
use crate::normalize::LineKey;

pub type EntrySource = Box<dyn Iterator<Item = Result<Entry, Error>> + Send>;

pub struct KWayMerge<I>
where
    I: Iterator<Item = Result<Entry, Error>>,
{
    sources: Vec<I>,
    // (key, source index, count)
    heap: BinaryHeap<Reverse<(LineKey, usize, u32)>>,
    pending: Option<Error>,
    done: bool,
}

impl<I> KWayMerge<I>
where
    I: Iterator<Item = Result<Entry, Error>>,
{
    pub fn new(sources: Vec<I>) -> Self {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            pending: None,
            done: false,
        };
        for idx in 0..merge.sources.len() {
            if let Err(e) = merge.pull(idx) {
                merge.pending = Some(e);
                break;
            }
        }
        merge
    }

    fn pull(&mut self, idx: usize) -> Result<(), Error> {
        if let Some(entry) = self.sources[idx].next() {
            let (key, count) = entry?;
            self.heap.push(Reverse((key, idx, count)));
        }
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, Error> {
        let Reverse((key, idx, mut count)) = match self.heap.pop() {
            Some(head) => head,
            None => return Ok(None),
        };
        self.pull(idx)?;

        while let Some(Reverse((next_key, _, _))) = self.heap.peek() {
            if *next_key != key {
                break;
            }
            if let Some(Reverse((_, idx, other))) = self.heap.pop() {
                count = count.checked_add(other).ok_or_else(|| {
                    Error::MergeInconsistency(format!("count overflow for key {:016x}", key))
                })?;
                self.pull(idx)?;
            }
        }
        Ok(Some((key, count)))
    }
}

impl<I> Iterator for KWayMerge<I>
where
    I: Iterator<Item = Result<Entry, Error>>,
{
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.pending.take() {
            self.done = true;
            return Some(Err(e));
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(entries: Vec<Entry>) -> std::vec::IntoIter<Result<Entry, Error>> {
        entries.into_iter().map(Ok).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn sums_shared_keys() {
        let merged: Vec<Entry> = KWayMerge::new(vec![
            source(vec![(1, 2), (2, 1)]),
            source(vec![(1, 1), (3, 5)]),
            source(vec![]),
            source(vec![(2, 4), (9, 1)]),
        ])
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(merged, vec![(1, 3), (2, 5), (3, 5), (9, 1)]);
    }

    #[test]
    fn overflow_is_an_inconsistency() {
        let res: Result<Vec<Entry>, Error> =
            KWayMerge::new(vec![source(vec![(1, u32::MAX)]), source(vec![(1, 1)])]).collect();
        assert!(matches!(res, Err(Error::MergeInconsistency(_))));
    }

    #[test]
    fn source_errors_stop_the_merge() {
        let failing = vec![
            Ok((1, 1)),
            Err(Error::Custom("boom".to_string())),
            Ok((5, 1)),
        ]
        .into_iter();
        let items: Vec<_> = KWayMerge::new(vec![failing, source(vec![(2, 1)])]).collect();
        assert!(items.iter().any(|r| r.is_err()));
        assert!(items.last().unwrap().is_err());
    }
}
