/*! Extraction

Applies filter policies to count info files. Every extraction of a run is applied
during a single read of each count info file, each one writing its own filtered file.
Documents left without lines are not written.
!*/
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::error::Error;
use crate::filtering::{Band, DocumentFilter, FilterPolicy, LineDecision, PunctuationFilter};
use crate::io::reader::CountInfoReader;
use crate::io::writer::{JsonlWriter, WriterTrait};
use crate::types::{Annotation, CountInfoDocument, FilteredDocument};

/// A policy, optionally refined by a punctuation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub policy: FilterPolicy,
    pub punctuation: Option<PunctuationFilter>,
}

impl Extraction {
    pub fn new(policy: FilterPolicy, punctuation: Option<PunctuationFilter>) -> Self {
        Self {
            policy,
            punctuation,
        }
    }

    pub fn name(&self) -> String {
        match &self.punctuation {
            Some(p) => format!("{}-punct{}", self.policy.name(), p.max_gap()),
            None => self.policy.name(),
        }
    }

    pub fn decide(&self, doc: &CountInfoDocument) -> Vec<LineDecision> {
        let mut decisions = self.policy.decide(doc);
        if let Some(punctuation) = &self.punctuation {
            punctuation.refine(&doc.lines, &mut decisions);
        }
        decisions
    }
}

/// Statistics of an extraction, flat so that they also fit a csv row.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    pub extraction: String,
    pub files: u64,
    pub documents: u64,
    pub kept_documents: u64,
    pub dropped_documents: u64,
    pub malformed: u64,
    pub lines: u64,
    pub kept_lines: u64,
    pub dropped_lines: u64,
    pub annotated_lines: u64,
    pub zero_count_lines: u64,
    pub rare_lines: u64,
    pub common_lines: u64,
    pub frequent_lines: u64,
    pub boilerplate_lines: u64,
}

impl ExtractStats {
    pub fn new(extraction: String) -> Self {
        Self {
            extraction,
            ..Default::default()
        }
    }

    fn add_band(&mut self, band: Band) {
        match band {
            Band::Rare => self.rare_lines += 1,
            Band::Common => self.common_lines += 1,
            Band::Frequent => self.frequent_lines += 1,
            Band::Boilerplate => self.boilerplate_lines += 1,
        }
    }

    pub fn add(&mut self, other: &ExtractStats) {
        self.files += other.files;
        self.documents += other.documents;
        self.kept_documents += other.kept_documents;
        self.dropped_documents += other.dropped_documents;
        self.malformed += other.malformed;
        self.lines += other.lines;
        self.kept_lines += other.kept_lines;
        self.dropped_lines += other.dropped_lines;
        self.annotated_lines += other.annotated_lines;
        self.zero_count_lines += other.zero_count_lines;
        self.rare_lines += other.rare_lines;
        self.common_lines += other.common_lines;
        self.frequent_lines += other.frequent_lines;
        self.boilerplate_lines += other.boilerplate_lines;
    }
}

/// Build the filtered document from line decisions.
/// Returns [None] when no line is kept.
pub fn filter_document(
    doc: &CountInfoDocument,
    decisions: &[LineDecision],
    stats: &mut ExtractStats,
) -> Option<FilteredDocument> {
    stats.documents += 1;

    let mut kept = Vec::new();
    let mut annotations = Vec::new();
    for (position, ((line, count), decision)) in
        doc.lines.iter().zip(&doc.counts).zip(decisions).enumerate()
    {
        stats.lines += 1;
        if *count == 0 {
            stats.zero_count_lines += 1;
        }
        if let Some(band) = decision.band {
            stats.add_band(band);
        }
        if !decision.keep {
            stats.dropped_lines += 1;
            continue;
        }
        stats.kept_lines += 1;
        kept.push(line.as_str());
        if let (true, Some(band)) = (decision.annotate, decision.band) {
            stats.annotated_lines += 1;
            annotations.push(Annotation { position, band });
        }
    }

    if kept.is_empty() {
        stats.dropped_documents += 1;
        return None;
    }
    stats.kept_documents += 1;
    Some(FilteredDocument {
        id: doc.id.clone(),
        snapshot: doc.snapshot.clone(),
        language: doc.language.clone(),
        text: kept.join("\n"),
        annotations,
    })
}

/// Apply `extractions` to the count info file `src`, writing each result to its paired path.
///
/// Returns one stats value per extraction, in order.
pub fn extract_file(
    src: &Path,
    extractions: &[(Extraction, PathBuf)],
) -> Result<Vec<ExtractStats>, Error> {
    let mut stats: Vec<ExtractStats> = extractions
        .iter()
        .map(|(e, _)| ExtractStats {
            files: 1,
            ..ExtractStats::new(e.name())
        })
        .collect();
    let mut writers = extractions
        .iter()
        .map(|(_, dst)| JsonlWriter::create(dst))
        .collect::<Result<Vec<JsonlWriter<FilteredDocument>>, Error>>()?;

    debug!("extracting {:?} with {} extractions", src, extractions.len());
    for doc in CountInfoReader::from_path(src)? {
        let doc = match doc {
            Ok(doc) => match doc.validate() {
                Ok(()) => doc,
                Err(reason) => {
                    warn!("skipping malformed document {} in {:?}: {}", doc.id, src, reason);
                    stats.iter_mut().for_each(|s| s.malformed += 1);
                    continue;
                }
            },
            Err(Error::MalformedDocument { location, reason }) => {
                warn!("skipping malformed document at {}: {}", location, reason);
                stats.iter_mut().for_each(|s| s.malformed += 1);
                continue;
            }
            Err(e) => return Err(e),
        };

        for (((extraction, _), writer), stats) in
            extractions.iter().zip(writers.iter_mut()).zip(stats.iter_mut())
        {
            let decisions = extraction.decide(&doc);
            if let Some(filtered) = filter_document(&doc, &decisions, stats) {
                writer.write_single(&filtered)?;
            }
        }
    }

    for writer in writers {
        writer.finish()?;
    }
    Ok(stats)
}
