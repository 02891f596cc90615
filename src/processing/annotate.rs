/*! Count info annotation

Streams a corpus file and attaches to every line its global count, producing
one [CountInfoDocument] per document.

Documents are resolved in batches: the distinct keys of a batch are looked up together,
which lets a streaming table serve a whole batch with a single scan.
Lines that are empty once normalized get a count of 0. A key missing from the table
(the table was built over another corpus, or with other normalization options) also gets 0,
and is reported as an anomaly.
!*/
use std::path::Path;

use log::{debug, warn};
use serde::Serialize;

use crate::error::Error;
use crate::io::reader::DocReader;
use crate::io::writer::{JsonlWriter, WriterTrait};
use crate::normalize::{LineKey, Normalizer};
use crate::processing::table::CountLookup;
use crate::types::{CountInfoDocument, Document};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotateStats {
    pub files: u64,
    pub skipped_files: u64,
    pub documents: u64,
    pub malformed: u64,
    pub lines: u64,
    pub empty_lines: u64,
    pub anomalies: u64,
}

impl AnnotateStats {
    pub fn add(&mut self, other: &AnnotateStats) {
        self.files += other.files;
        self.skipped_files += other.skipped_files;
        self.documents += other.documents;
        self.malformed += other.malformed;
        self.lines += other.lines;
        self.empty_lines += other.empty_lines;
        self.anomalies += other.anomalies;
    }
}

/// Resolve the counts of a batch of documents.
pub fn resolve_batch(
    docs: Vec<Document>,
    normalizer: &Normalizer,
    lookup: &dyn CountLookup,
    stats: &mut AnnotateStats,
) -> Result<Vec<CountInfoDocument>, Error> {
    let line_keys: Vec<Vec<Option<LineKey>>> = docs
        .iter()
        .map(|doc| doc.lines().iter().map(|l| normalizer.key(l)).collect())
        .collect();

    let mut keys: Vec<LineKey> = line_keys.iter().flatten().filter_map(|k| *k).collect();
    keys.sort_unstable();
    keys.dedup();
    let counts = lookup.lookup_sorted(&keys)?;

    let mut annotated = Vec::with_capacity(docs.len());
    for (doc, doc_keys) in docs.into_iter().zip(line_keys) {
        let line_counts: Vec<u32> = doc_keys
            .iter()
            .enumerate()
            .map(|(position, key)| match key {
                None => {
                    stats.empty_lines += 1;
                    0
                }
                Some(key) => {
                    let found = keys
                        .binary_search(key)
                        .ok()
                        .and_then(|idx| counts[idx]);
                    found.unwrap_or_else(|| {
                        debug!(
                            "[{}] line {} of {} is not in the table",
                            doc.snapshot(),
                            position,
                            doc.id()
                        );
                        stats.anomalies += 1;
                        0
                    })
                }
            })
            .collect();

        stats.documents += 1;
        stats.lines += line_counts.len() as u64;
        let (id, snapshot, language, lines) = doc.into_parts();
        annotated.push(CountInfoDocument {
            id,
            snapshot,
            language,
            lines,
            counts: line_counts,
        });
    }
    Ok(annotated)
}

/// Annotate the corpus file `src` into the count info file `dst`.
pub fn annotate_file(
    src: &Path,
    dst: &Path,
    snapshot: &str,
    normalizer: &Normalizer,
    lookup: &dyn CountLookup,
    batch_size: usize,
) -> Result<AnnotateStats, Error> {
    let mut stats = AnnotateStats {
        files: 1,
        ..Default::default()
    };
    let mut writer = JsonlWriter::create(dst)?;
    let mut batch = Vec::with_capacity(batch_size);

    for doc in DocReader::from_path(src, snapshot)? {
        match doc {
            Ok(doc) => batch.push(doc),
            Err(Error::MalformedDocument { location, reason }) => {
                warn!(
                    "[{}] skipping malformed document at {}: {}",
                    snapshot, location, reason
                );
                stats.malformed += 1;
            }
            Err(e) => return Err(e),
        }
        if batch.len() >= batch_size {
            let docs = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            writer.write(resolve_batch(docs, normalizer, lookup, &mut stats)?)?;
        }
    }
    if !batch.is_empty() {
        writer.write(resolve_batch(batch, normalizer, lookup, &mut stats)?)?;
    }
    writer.finish()?;

    if stats.anomalies > 0 {
        warn!(
            "[{}] {} lines of {:?} were not in the table and got a count of 0",
            snapshot, stats.anomalies, src
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::CountInfoReader;
    use crate::processing::table::FrequencyTable;

    #[test]
    fn counts_and_anomalies() {
        let n = Normalizer::default();
        let mut entries = vec![(n.key("menu").unwrap(), 3), (n.key("hello").unwrap(), 1)];
        entries.sort_unstable();
        let table = FrequencyTable::from_entries(entries, 3);

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("00000.jsonl");
        std::fs::write(
            &src,
            concat!(
                r#"{"id": "a", "text": "Menu\n\nhello\nunknown"}"#,
                "\n",
                "{broken\n",
                r#"{"id": "b", "lines": ["menu"]}"#,
                "\n"
            ),
        )
        .unwrap();
        let dst = dir.path().join("out").join("00000.jsonl.gz");

        let stats = annotate_file(&src, &dst, "s", &n, &table, 1).unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.lines, 5);
        assert_eq!(stats.empty_lines, 1);
        assert_eq!(stats.anomalies, 1);

        let docs: Vec<CountInfoDocument> = CountInfoReader::from_path(&dst)
            .unwrap()
            .map(|d| d.unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].lines, vec!["Menu", "", "hello", "unknown"]);
        assert_eq!(docs[0].counts, vec![3, 0, 1, 0]);
        assert_eq!(docs[1].counts, vec![3]);
        assert_eq!(docs[1].snapshot, "s");
    }
}
