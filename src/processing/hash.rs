/*! Shard hashing

Counts, for one shard range, the number of distinct documents containing each
normalized line, and writes the result as a partial.

Lines are deduplicated per document before counting, so that a line repeated in a document
counts once. When the number of distinct keys of a range outgrows its entry budget,
counts are sorted and spilled to run files, which are k-way merged into the partial.
!*/
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::Error;
use crate::io::artifact::{self, ArtifactKind, ArtifactReader, ArtifactWriter, Entry};
use crate::io::reader::DocReader;
use crate::io::WorkDir;
use crate::normalize::{LineKey, Normalizer};
use crate::processing::kway::KWayMerge;
use crate::processing::plan::ShardPlan;

/// Sorted keys of the distinct countable lines of a document.
pub fn document_keys(normalizer: &Normalizer, lines: &[String]) -> Vec<LineKey> {
    let mut keys: Vec<LineKey> = lines.iter().filter_map(|l| normalizer.key(l)).collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Hashing statistics, of a single range or summed over several.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HashStats {
    pub ranges: u64,
    pub skipped_ranges: u64,
    pub files: u64,
    pub documents: u64,
    pub malformed: u64,
    pub lines: u64,
    pub entries: u64,
    pub spills: u64,
}

impl HashStats {
    pub fn add(&mut self, other: &HashStats) {
        self.ranges += other.ranges;
        self.skipped_ranges += other.skipped_ranges;
        self.files += other.files;
        self.documents += other.documents;
        self.malformed += other.malformed;
        self.lines += other.lines;
        self.entries += other.entries;
        self.spills += other.spills;
    }
}

/// Document counts of a range, spilling to disk past `max_entries` keys.
pub struct LocalCounts {
    counts: HashMap<LineKey, u32>,
    max_entries: usize,
    spill_dir: PathBuf,
    spills: Vec<PathBuf>,
    snapshot: String,
    range: u32,
}

impl LocalCounts {
    pub fn new(spill_dir: PathBuf, snapshot: &str, range: u32, max_entries: usize) -> Self {
        Self {
            counts: HashMap::new(),
            max_entries: max_entries.max(1),
            spill_dir,
            spills: Vec::new(),
            snapshot: snapshot.to_string(),
            range,
        }
    }

    /// Count a document given its distinct keys.
    pub fn add_document(&mut self, keys: &[LineKey]) -> Result<(), Error> {
        for key in keys {
            let count = self.counts.entry(*key).or_insert(0);
            *count = count.checked_add(1).ok_or_else(|| {
                Error::MergeInconsistency(format!("count overflow for key {:016x}", key))
            })?;
        }
        if self.counts.len() >= self.max_entries {
            self.spill()?;
        }
        Ok(())
    }

    pub fn nb_spills(&self) -> usize {
        self.spills.len()
    }

    fn sorted(&mut self) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self.counts.drain().collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }

    fn spill(&mut self) -> Result<(), Error> {
        let entries = self.sorted();
        let path = self
            .spill_dir
            .join(format!("run_{:05}.bin", self.spills.len()));
        debug!(
            "[{}/range {}] spilling {} entries to {:?}",
            self.snapshot,
            self.range,
            entries.len(),
            path
        );
        artifact::write_all(
            &path,
            ArtifactKind::Partial,
            &self.snapshot,
            Some(self.range),
            &entries,
            0,
        )?;
        self.spills.push(path);
        Ok(())
    }

    /// Write the partial to `dst`, returning its number of entries.
    pub fn finish(mut self, dst: &Path, documents: u64) -> Result<u64, Error> {
        if self.spills.is_empty() {
            let entries = self.sorted();
            return artifact::write_all(
                dst,
                ArtifactKind::Partial,
                &self.snapshot,
                Some(self.range),
                &entries,
                documents,
            );
        }

        if !self.counts.is_empty() {
            self.spill()?;
        }
        let runs = self
            .spills
            .iter()
            .map(|path| ArtifactReader::open(path))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut writer =
            ArtifactWriter::create(dst, ArtifactKind::Partial, &self.snapshot, Some(self.range))?;
        for entry in KWayMerge::new(runs) {
            let (key, count) = entry?;
            writer.push(key, count)?;
        }
        let entries = writer.finish(documents)?;
        std::fs::remove_dir_all(&self.spill_dir)?;
        Ok(entries)
    }
}

/// Hash every document of a plan's range into its partial.
///
/// Malformed documents are logged and skipped. Any other error aborts the range,
/// leaving no partial behind.
pub fn hash_range(
    work: &WorkDir,
    plan: &ShardPlan,
    range: usize,
    normalizer: &Normalizer,
    max_entries: usize,
) -> Result<HashStats, Error> {
    let snapshot = plan.snapshot.as_str();
    let files = plan.range_files(range).ok_or_else(|| {
        Error::Custom(format!(
            "[{}] range {} is out of the plan ({} ranges)",
            snapshot,
            range,
            plan.num_ranges()
        ))
    })?;
    if normalizer.options() != &plan.normalize {
        return Err(Error::Custom(format!(
            "[{}] plan is hashed with normalization {:?}, not {:?}",
            snapshot,
            plan.normalize,
            normalizer.options()
        )));
    }
    let range_id: u32 = range
        .try_into()
        .map_err(|_| Error::Custom(format!("range index {} is too large", range)))?;

    // leftovers of a killed run
    let spill_dir = work.spill_dir(snapshot, range);
    if spill_dir.exists() {
        std::fs::remove_dir_all(&spill_dir)?;
    }

    let mut stats = HashStats {
        ranges: 1,
        ..Default::default()
    };
    let mut counts = LocalCounts::new(spill_dir, snapshot, range_id, max_entries);

    for file in files {
        debug!("[{}/range {}] hashing {:?}", snapshot, range, file);
        stats.files += 1;
        for doc in DocReader::from_path(file, snapshot)? {
            match doc {
                Ok(doc) => {
                    stats.documents += 1;
                    stats.lines += doc.lines().len() as u64;
                    counts.add_document(&document_keys(normalizer, doc.lines()))?;
                }
                Err(Error::MalformedDocument { location, reason }) => {
                    warn!(
                        "[{}/range {}] skipping malformed document at {}: {}",
                        snapshot, range, location, reason
                    );
                    stats.malformed += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    stats.spills = counts.nb_spills() as u64;
    stats.entries = counts.finish(&work.partial_path(snapshot, range), stats.documents)?;
    info!(
        "[{}/range {}] {} documents, {} distinct lines ({} malformed, {} spills)",
        snapshot, range, stats.documents, stats.entries, stats.malformed, stats.spills
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::normalize::NormalizeOptions;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keys_are_distinct_per_document() {
        let n = Normalizer::new(NormalizeOptions::default());
        let keys = document_keys(&n, &lines(&["Hello", "hello ", "", "   ", "World 1", "world 2"]));
        // "hello" twice, "world 0" twice, empty lines ignored
        assert_eq!(keys.len(), 2);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn spilled_counts_equal_resident_counts() {
        let dir = tempfile::tempdir().unwrap();
        let docs: Vec<Vec<LineKey>> = (0..50u64)
            .map(|d| {
                let mut keys: Vec<LineKey> = (0..20).map(|i| (d * 7 + i) % 60).collect();
                keys.sort_unstable();
                keys.dedup();
                keys
            })
            .collect();

        let mut outputs = Vec::new();
        for (name, max_entries) in [("resident", usize::MAX), ("spilled", 16)] {
            let mut counts = LocalCounts::new(dir.path().join(name).join("spill"), "s", 0, max_entries);
            for keys in &docs {
                counts.add_document(keys).unwrap();
            }
            if max_entries == 16 {
                assert!(counts.nb_spills() > 0);
            }
            let dst = dir.path().join(name).join("range_00000.bin");
            counts.finish(&dst, docs.len() as u64).unwrap();
            assert!(!dir.path().join(name).join("spill").exists());
            outputs.push(fs::read(&dst).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn hash_range_counts_documents() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let work = WorkDir::new(work.path());
        let corpus = src.path().join("s");
        fs::create_dir_all(&corpus).unwrap();
        fs::write(
            corpus.join("a.jsonl"),
            concat!(
                r#"{"id": "1", "text": "menu\nmenu\nhello"}"#,
                "\n",
                "garbage\n",
                r#"{"id": "2", "text": "menu\nbye"}"#,
                "\n"
            ),
        )
        .unwrap();

        let plan = ShardPlan::from_dir(src.path(), "s", 1).unwrap();
        let n = Normalizer::default();
        let stats = hash_range(&work, &plan, 0, &n, 1024).unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.entries, 3);

        let (info, entries) = ArtifactReader::open(&work.partial_path("s", 0))
            .unwrap()
            .read_all()
            .unwrap();
        assert_eq!(info.documents, 2);
        let menu = n.key("menu").unwrap();
        assert_eq!(entries.iter().find(|(k, _)| *k == menu), Some(&(menu, 2)));

        assert!(hash_range(&work, &plan, 1, &n, 1024).is_err());

        let stripped = Normalizer::new(NormalizeOptions {
            ascii_punctuation: true,
            ..Default::default()
        });
        assert!(hash_range(&work, &plan, 0, &stripped, 1024).is_err());
    }
}
