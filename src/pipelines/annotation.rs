//! Count info pipeline.
//!
//! Annotates every corpus file of the planned snapshots against a merged table,
//! one count info file per corpus file, in parallel.
//! The table is shared by all workers, resident or streamed depending on the memory budget.
//!
//! The count info directory remembers which table it was computed against (`table.json`).
//! Count info of another table (or of an unknown one) is removed before annotating,
//! so that existing files are only skipped when they hold the current table's counts.
use std::path::PathBuf;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::pipeline::{check_failures, Pipeline};
use crate::config::Config;
use crate::error::Error;
use crate::io::writer::write_json;
use crate::io::WorkDir;
use crate::normalize::Normalizer;
use crate::processing::annotate::{annotate_file, AnnotateStats};
use crate::processing::merge::{sha256_file, Manifest};
use crate::processing::table::open_lookup;
use crate::processing::ShardPlan;

/// Identity of a merged table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStamp {
    pub table: String,
    pub manifest_sha256: String,
    pub documents: u64,
    pub entries: u64,
}

pub struct AnnotatePipeline {
    work: WorkDir,
    name: String,
    snapshots: Vec<String>,
    config: Config,
    force: bool,
}

impl AnnotatePipeline {
    pub fn new(work: WorkDir, name: String, snapshots: Vec<String>, config: Config) -> Self {
        Self {
            work,
            name,
            snapshots,
            config,
            force: false,
        }
    }

    /// Annotate files that already have count info.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Check the table's manifest, and return the table's identity.
    ///
    /// Fails when the table was hashed with another normalization. Warns about
    /// snapshots the table was not built over: most of their lines will be anomalies.
    fn check_manifest(&self) -> Result<TableStamp, Error> {
        let path = self.work.manifest_path(&self.name);
        let manifest = Manifest::load(&path)?;
        if manifest.normalize != self.config.normalize {
            return Err(Error::Custom(format!(
                "[{}] table is hashed with normalization {:?}, annotation would use {:?}",
                self.name, manifest.normalize, self.config.normalize
            )));
        }
        for snapshot in &self.snapshots {
            if !manifest.snapshots.contains(snapshot) {
                warn!(
                    "[{}] snapshot {} did not contribute to the table",
                    self.name, snapshot
                );
            }
        }
        Ok(TableStamp {
            table: self.name.clone(),
            manifest_sha256: sha256_file(&path)?,
            documents: manifest.documents,
            entries: manifest.entries,
        })
    }

    /// Remove count info computed against another table, and record the current one.
    fn prepare_count_info(&self, stamp: &TableStamp) -> Result<(), Error> {
        let stamp_path = self.work.count_info_stamp_path(&self.name);
        let previous: Option<TableStamp> = std::fs::read_to_string(&stamp_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());
        if previous.as_ref() == Some(stamp) {
            return Ok(());
        }

        let dir = self.work.count_info_dir(&self.name);
        if dir.exists() {
            info!(
                "[{}] count info in {:?} is not from the current table, removing it",
                self.name, dir
            );
            std::fs::remove_dir_all(&dir)?;
        }
        write_json(&stamp_path, stamp)
    }
}

impl Pipeline<AnnotateStats> for AnnotatePipeline {
    fn run(&self) -> Result<AnnotateStats, Error> {
        let stamp = self.check_manifest()?;
        self.prepare_count_info(&stamp)?;
        let lookup = open_lookup(&self.work.table_path(&self.name), self.config.memory_budget.0)?;
        let normalizer = Normalizer::new(self.config.normalize.clone());

        let mut stats = AnnotateStats::default();
        let mut jobs: Vec<(String, PathBuf, PathBuf)> = Vec::new();
        for snapshot in &self.snapshots {
            let plan = ShardPlan::load(&self.work.plan_path(snapshot))?;
            for (idx, src) in plan.files.iter().enumerate() {
                let dst = self.work.count_info_path(&self.name, snapshot, idx);
                if dst.exists() && !self.force {
                    debug!("[{}] {:?} exists, skipping", snapshot, dst);
                    stats.skipped_files += 1;
                    continue;
                }
                jobs.push((snapshot.clone(), src.clone(), dst));
            }
        }
        info!(
            "[{}] annotating {} files ({} already done)",
            self.name,
            jobs.len(),
            stats.skipped_files
        );

        let results: Vec<(String, Result<AnnotateStats, Error>)> = jobs
            .par_iter()
            .map(|(snapshot, src, dst)| {
                let unit = format!("{}/{:?}", snapshot, src);
                let res = annotate_file(
                    src,
                    dst,
                    snapshot,
                    &normalizer,
                    lookup.as_ref(),
                    self.config.batch_size,
                );
                (unit, res)
            })
            .collect();

        let mut failures = Vec::new();
        for (unit, result) in results {
            match result {
                Ok(file_stats) => stats.add(&file_stats),
                Err(e) => failures.push((unit, e)),
            }
        }
        check_failures("annotate", failures)?;

        info!(
            "[{}] annotated {} documents, {} lines ({} lookup anomalies, {} malformed documents)",
            self.name, stats.documents, stats.lines, stats.anomalies, stats.malformed
        );
        if stats.anomalies > 0 {
            warn!(
                "[{}] {} lines were missing from the table: was it built over the same corpus and normalization?",
                self.name, stats.anomalies
            );
        }
        Ok(stats)
    }
}
