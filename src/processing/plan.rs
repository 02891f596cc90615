/*! Shard plans

A snapshot's corpus files are sorted by path and cut into contiguous ranges of
`files_per_range` files. A range is the unit of hashing work: its partial is a
checkpoint, and a killed run resumes by hashing the ranges with no partial.

The plan is saved as `plan.json` the first time a snapshot is hashed, and later runs
must agree with it, otherwise range indices would not designate the same files.
The plan also records the line normalization its partials are hashed with,
so that partials hashed differently are never mixed.
!*/
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::io::writer::write_json;
use crate::io::WorkDir;
use crate::normalize::NormalizeOptions;

const CORPUS_EXTENSIONS: [&str; 4] = [".jsonl", ".json", ".jsonl.gz", ".json.gz"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    pub snapshot: String,
    pub files_per_range: usize,
    pub normalize: NormalizeOptions,
    pub files: Vec<PathBuf>,
}

fn is_corpus_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| {
                CORPUS_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
            })
}

impl ShardPlan {
    pub fn new(
        snapshot: &str,
        mut files: Vec<PathBuf>,
        files_per_range: usize,
    ) -> Result<Self, Error> {
        if files_per_range == 0 {
            return Err(Error::Custom("files_per_range must be positive".to_string()));
        }
        files.sort();
        Ok(Self {
            snapshot: snapshot.to_string(),
            files_per_range,
            normalize: NormalizeOptions::default(),
            files,
        })
    }

    pub fn with_normalize(mut self, normalize: NormalizeOptions) -> Self {
        self.normalize = normalize;
        self
    }

    /// Plan every corpus file found under `<src>/<snapshot>`.
    pub fn from_dir(src: &Path, snapshot: &str, files_per_range: usize) -> Result<Self, Error> {
        let root = src.join(snapshot);
        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&root.to_string_lossy())
        );
        debug!("[{}] looking for corpus files in {:?}", snapshot, root);

        let mut files = Vec::new();
        for path in glob::glob(&pattern)? {
            let path = path?;
            if is_corpus_file(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(Error::Custom(format!(
                "[{}] no corpus files found in {:?}",
                snapshot, root
            )));
        }

        Self::new(snapshot, files, files_per_range)
    }

    pub fn num_ranges(&self) -> usize {
        (self.files.len() + self.files_per_range - 1) / self.files_per_range
    }

    pub fn ranges(&self) -> Range<usize> {
        0..self.num_ranges()
    }

    /// Indices (in [ShardPlan::files]) of the files of a range.
    pub fn range_indices(&self, range: usize) -> Option<Range<usize>> {
        if range >= self.num_ranges() {
            return None;
        }
        let start = range * self.files_per_range;
        let end = (start + self.files_per_range).min(self.files.len());
        Some(start..end)
    }

    pub fn range_files(&self, range: usize) -> Option<&[PathBuf]> {
        self.range_indices(range).map(|idx| &self.files[idx])
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let f = File::open(path).map_err(|e| {
            Error::Custom(format!("could not open plan {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        write_json(path, self)
    }

    /// Load the snapshot's saved plan, checking that it matches a freshly computed one,
    /// or save the fresh plan if none exists yet.
    pub fn load_or_create(
        work: &WorkDir,
        src: &Path,
        snapshot: &str,
        files_per_range: usize,
        normalize: &NormalizeOptions,
    ) -> Result<Self, Error> {
        let fresh =
            Self::from_dir(src, snapshot, files_per_range)?.with_normalize(normalize.clone());
        let plan_path = work.plan_path(snapshot);

        if plan_path.exists() {
            let saved = Self::load(&plan_path)?;
            if saved.normalize != fresh.normalize {
                return Err(Error::Custom(format!(
                    "[{}] normalization {:?} differs from {:?}, the one of the saved plan {:?}. Remove the snapshot's hash directory to start over.",
                    snapshot, fresh.normalize, saved.normalize, plan_path
                )));
            }
            if saved != fresh {
                return Err(Error::Custom(format!(
                    "[{}] corpus files or range size differ from the saved plan {:?} ({} files / {} per range saved, {} files / {} per range now). Remove the snapshot's hash directory to start over.",
                    snapshot,
                    plan_path,
                    saved.files.len(),
                    saved.files_per_range,
                    fresh.files.len(),
                    fresh.files_per_range,
                )));
            }
            debug!("[{}] using saved plan {:?}", snapshot, plan_path);
            Ok(saved)
        } else {
            fresh.save(&plan_path)?;
            info!(
                "[{}] planned {} files in {} ranges",
                snapshot,
                fresh.files.len(),
                fresh.num_ranges()
            );
            Ok(fresh)
        }
    }

    /// Ranges that have no partial in the work directory.
    pub fn missing_ranges(&self, work: &WorkDir) -> Vec<usize> {
        self.ranges()
            .filter(|range| !work.partial_path(&self.snapshot, *range).exists())
            .collect()
    }
}
