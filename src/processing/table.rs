/*! Frequency table lookups

The annotator resolves the keys of a batch of documents at once, through [CountLookup].
A table that fits the memory budget is loaded as sorted arrays and searched ([FrequencyTable]).
A larger one stays on disk ([StreamingTable]): a sparse index of every
[INDEX_STRIDE]th key is kept in memory, and a lookup reads the one block of entries
its key can be in.
!*/
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Error;
use crate::io::artifact::{read_entries_at, ArtifactKind, ArtifactReader, Entry};
use crate::normalize::LineKey;

/// Resident size of a table entry.
const ENTRY_BYTES: u64 = 12;
/// Entries per block of a [StreamingTable].
pub const INDEX_STRIDE: u64 = 1024;

pub trait CountLookup: Send + Sync {
    /// Counts of sorted, distinct `keys`, aligned with them.
    /// Keys that are not in the table are [None].
    fn lookup_sorted(&self, keys: &[LineKey]) -> Result<Vec<Option<u32>>, Error>;

    /// Number of documents the table was built over.
    fn documents(&self) -> u64;
}

fn check_table(path: &Path, reader: &ArtifactReader) -> Result<(), Error> {
    if reader.info().kind != ArtifactKind::Table {
        return Err(Error::CorruptShardArtifact {
            path: path.to_path_buf(),
            reason: "not a frequency table".to_string(),
        });
    }
    Ok(())
}

/// A table held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    keys: Vec<LineKey>,
    counts: Vec<u32>,
    documents: u64,
}

impl FrequencyTable {
    /// Build from entries sorted by key.
    pub fn from_entries(entries: Vec<Entry>, documents: u64) -> Self {
        let (keys, counts) = entries.into_iter().unzip();
        Self {
            keys,
            counts,
            documents,
        }
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let reader = ArtifactReader::open(path)?;
        check_table(path, &reader)?;
        let (info, entries) = reader.read_all()?;
        Ok(Self::from_entries(entries, info.documents))
    }

    #[inline]
    pub fn get(&self, key: LineKey) -> Option<u32> {
        self.keys
            .binary_search(&key)
            .ok()
            .map(|idx| self.counts[idx])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CountLookup for FrequencyTable {
    fn lookup_sorted(&self, keys: &[LineKey]) -> Result<Vec<Option<u32>>, Error> {
        Ok(keys.iter().map(|key| self.get(*key)).collect())
    }

    fn documents(&self) -> u64 {
        self.documents
    }
}

/// A table read from disk for every lookup, through a sparse key index.
#[derive(Debug, Clone)]
pub struct StreamingTable {
    path: PathBuf,
    documents: u64,
    entries: u64,
    header_len: u64,
    /// First key of every block of [INDEX_STRIDE] entries.
    index: Vec<LineKey>,
}

impl StreamingTable {
    /// Open a table, reading it through once to check its integrity and build the index.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let reader = ArtifactReader::open(path)?;
        check_table(path, &reader)?;
        let documents = reader.info().documents;
        let entries = reader.info().entries;
        let header_len = reader.header_len();

        let mut index = Vec::with_capacity((entries / INDEX_STRIDE + 1) as usize);
        for (idx, entry) in reader.enumerate() {
            let (key, _) = entry?;
            if idx as u64 % INDEX_STRIDE == 0 {
                index.push(key);
            }
        }
        debug!("indexed {} blocks of {:?}", index.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            documents,
            entries,
            header_len,
            index,
        })
    }

    /// Block that holds `key` if the table has it.
    fn block_of(&self, key: LineKey) -> Option<usize> {
        self.index.partition_point(|first| *first <= key).checked_sub(1)
    }

    fn read_block(&self, src: &mut BufReader<File>, block: usize) -> Result<Vec<Entry>, Error> {
        let start = block as u64 * INDEX_STRIDE;
        let count = INDEX_STRIDE.min(self.entries - start);
        read_entries_at(src, &self.path, self.header_len, start, count)
    }
}

impl CountLookup for StreamingTable {
    fn lookup_sorted(&self, keys: &[LineKey]) -> Result<Vec<Option<u32>>, Error> {
        let mut src = BufReader::new(File::open(&self.path)?);
        let mut loaded: Option<(usize, Vec<Entry>)> = None;
        let mut counts = Vec::with_capacity(keys.len());
        for key in keys {
            let block = match self.block_of(*key) {
                Some(block) => block,
                None => {
                    counts.push(None);
                    continue;
                }
            };
            if loaded.as_ref().map(|(b, _)| *b) != Some(block) {
                loaded = Some((block, self.read_block(&mut src, block)?));
            }
            let count = loaded.as_ref().and_then(|(_, entries)| {
                entries
                    .binary_search_by_key(key, |(k, _)| *k)
                    .ok()
                    .map(|idx| entries[idx].1)
            });
            counts.push(count);
        }
        Ok(counts)
    }

    fn documents(&self) -> u64 {
        self.documents
    }
}

/// Open a table, resident if it fits `memory_budget` bytes.
pub fn open_lookup(path: &Path, memory_budget: u64) -> Result<Box<dyn CountLookup>, Error> {
    let entries = ArtifactReader::open(path)?.info().entries;
    if entries.saturating_mul(ENTRY_BYTES) <= memory_budget {
        info!("loading {} table entries from {:?}", entries, path);
        Ok(Box::new(FrequencyTable::open(path)?))
    } else {
        info!(
            "{} table entries exceed the memory budget, streaming {:?}",
            entries, path
        );
        Ok(Box::new(StreamingTable::open(path)?))
    }
}
