//! Shard hashing pipeline.
//!
//! Plans every snapshot, then hashes the selected ranges in parallel.
//! Ranges that already have a partial are skipped unless forced,
//! so that a re-run only hashes what a killed run left over.
use std::ops::Range;
use std::path::PathBuf;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::pipeline::{check_failures, Pipeline};
use crate::config::Config;
use crate::error::Error;
use crate::io::WorkDir;
use crate::normalize::Normalizer;
use crate::processing::hash::{hash_range, HashStats};
use crate::processing::ShardPlan;

pub struct HashPipeline {
    src: PathBuf,
    work: WorkDir,
    snapshots: Vec<String>,
    config: Config,
    ranges: Option<Range<usize>>,
    force: bool,
}

impl HashPipeline {
    pub fn new(src: PathBuf, work: WorkDir, snapshots: Vec<String>, config: Config) -> Self {
        Self {
            src,
            work,
            snapshots,
            config,
            ranges: None,
            force: false,
        }
    }

    /// Only hash these ranges.
    pub fn ranges(mut self, ranges: Option<Range<usize>>) -> Self {
        self.ranges = ranges;
        self
    }

    /// Hash ranges that already have a partial.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Ranges of `plan` to hash.
    fn selected(&self, plan: &ShardPlan, stats: &mut HashStats) -> Vec<usize> {
        let all = plan.ranges();
        let wanted = match &self.ranges {
            Some(r) => {
                if r.end > all.end {
                    warn!(
                        "[{}] plan has {} ranges, ignoring ranges {}..{}",
                        plan.snapshot,
                        all.end,
                        all.end.max(r.start),
                        r.end
                    );
                }
                r.start.min(all.end)..r.end.min(all.end)
            }
            None => all,
        };

        wanted
            .filter(|range| {
                let exists = self.work.partial_path(&plan.snapshot, *range).exists();
                if exists && !self.force {
                    debug!("[{}/range {}] partial exists, skipping", plan.snapshot, range);
                    stats.skipped_ranges += 1;
                }
                !exists || self.force
            })
            .collect()
    }
}

impl Pipeline<HashStats> for HashPipeline {
    fn run(&self) -> Result<HashStats, Error> {
        let normalizer = Normalizer::new(self.config.normalize.clone());
        // ranges are hashed concurrently, and share the budget
        let max_entries =
            (self.config.max_resident_entries() / rayon::current_num_threads().max(1)).max(1024);

        let mut stats = HashStats::default();
        let mut plans = Vec::with_capacity(self.snapshots.len());
        for snapshot in &self.snapshots {
            plans.push(ShardPlan::load_or_create(
                &self.work,
                &self.src,
                snapshot,
                self.config.files_per_range,
                &self.config.normalize,
            )?);
        }

        let jobs: Vec<(&ShardPlan, usize)> = plans
            .iter()
            .flat_map(|plan| {
                self.selected(plan, &mut stats)
                    .into_iter()
                    .map(move |range| (plan, range))
            })
            .collect();
        info!(
            "hashing {} ranges of {} snapshots ({} already done)",
            jobs.len(),
            plans.len(),
            stats.skipped_ranges
        );

        let results: Vec<(String, Result<HashStats, Error>)> = jobs
            .into_par_iter()
            .map(|(plan, range)| {
                let unit = format!("{}/range {}", plan.snapshot, range);
                (unit, hash_range(&self.work, plan, range, &normalizer, max_entries))
            })
            .collect();

        let mut failures = Vec::new();
        for (unit, result) in results {
            match result {
                Ok(range_stats) => stats.add(&range_stats),
                Err(e) => failures.push((unit, e)),
            }
        }
        check_failures("hash", failures)?;

        info!(
            "hashed {} ranges: {} documents ({} malformed), {} lines",
            stats.ranges, stats.documents, stats.malformed, stats.lines
        );
        Ok(stats)
    }
}
