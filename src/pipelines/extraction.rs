//! Extraction pipeline.
//!
//! Applies a grid of extractions to the count info of a table. Each count info file is read once
//! for the whole grid. Writes per extraction statistics, and a csv summary of the grid.
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;
use rayon::prelude::*;

use super::pipeline::{check_failures, Pipeline};
use crate::error::Error;
use crate::filtering::{FilterPolicy, PunctuationFilter};
use crate::io::writer::{tmp_path, write_json};
use crate::io::WorkDir;
use crate::processing::extract::{extract_file, ExtractStats, Extraction};

pub struct ExtractPipeline {
    work: WorkDir,
    name: String,
    extractions: Vec<Extraction>,
}

/// Every policy, alone and refined by each punctuation gap.
pub fn sweep_grid(policies: &[FilterPolicy], punct_gaps: &[usize]) -> Vec<Extraction> {
    policies
        .iter()
        .flat_map(|policy| {
            std::iter::once(None)
                .chain(punct_gaps.iter().map(|gap| Some(PunctuationFilter::new(*gap))))
                .map(move |punct| Extraction::new(policy.clone(), punct))
        })
        .collect()
}

impl ExtractPipeline {
    pub fn new(work: WorkDir, name: String, extractions: Vec<Extraction>) -> Result<Self, Error> {
        if extractions.is_empty() {
            return Err(Error::InvalidPolicy("no policy given".to_string()));
        }
        if let Some(dup) = extractions.iter().map(Extraction::name).duplicates().next() {
            return Err(Error::InvalidPolicy(format!("extraction {} is given twice", dup)));
        }
        Ok(Self {
            work,
            name,
            extractions,
        })
    }

    /// Count info files, sorted, with their path relative to the count info directory.
    fn count_info_files(&self) -> Result<Vec<(PathBuf, PathBuf)>, Error> {
        let root = self.work.count_info_dir(&self.name);
        let pattern = format!(
            "{}/*/*.jsonl.gz",
            glob::Pattern::escape(&root.to_string_lossy())
        );
        let mut files = Vec::new();
        for path in glob::glob(&pattern)? {
            let path = path?;
            let relative = path
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .map_err(|e| Error::Custom(format!("{:?}: {}", path, e)))?;
            files.push((path, relative));
        }
        files.sort();
        if files.is_empty() {
            return Err(Error::Custom(format!(
                "[{}] no count info in {:?}",
                self.name, root
            )));
        }
        Ok(files)
    }

    fn write_sweep(&self, stats: &[ExtractStats]) -> Result<(), Error> {
        let dst = self.work.sweep_path(&self.name);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(&dst);
        let mut out = csv::WriterBuilder::new().from_path(&tmp)?;
        for entry in stats {
            out.serialize(entry)?;
        }
        out.flush()?;
        std::fs::rename(&tmp, &dst)?;
        Ok(())
    }
}

impl Pipeline<Vec<ExtractStats>> for ExtractPipeline {
    fn run(&self) -> Result<Vec<ExtractStats>, Error> {
        let files = self.count_info_files()?;
        let names: Vec<String> = self.extractions.iter().map(|e| e.name()).collect();
        info!(
            "[{}] {} extractions over {} count info files",
            self.name,
            names.len(),
            files.len()
        );

        let results: Vec<(String, Result<Vec<ExtractStats>, Error>)> = files
            .par_iter()
            .map(|(src, relative)| {
                let outputs: Vec<(Extraction, PathBuf)> = self
                    .extractions
                    .iter()
                    .zip(&names)
                    .map(|(e, name)| {
                        let dst = self.work.extracted_dir(name, &self.name).join(relative);
                        (e.clone(), dst)
                    })
                    .collect();
                (format!("{:?}", src), extract_file(src, &outputs))
            })
            .collect();

        let mut totals: Vec<ExtractStats> = names.iter().cloned().map(ExtractStats::new).collect();
        let mut failures = Vec::new();
        for (unit, result) in results {
            match result {
                Ok(file_stats) => totals
                    .iter_mut()
                    .zip(&file_stats)
                    .for_each(|(total, s)| total.add(s)),
                Err(e) => failures.push((unit, e)),
            }
        }
        check_failures("extract", failures)?;

        for stats in &totals {
            write_json(&self.work.stats_path(&stats.extraction, &self.name), stats)?;
            info!(
                "[{}] {}: kept {}/{} lines, {}/{} documents",
                self.name,
                stats.extraction,
                stats.kept_lines,
                stats.lines,
                stats.kept_documents,
                stats.documents
            );
        }
        self.write_sweep(&totals)?;
        Ok(totals)
    }
}
