/*! Hash merging

Sums every partial of a document set (one or more snapshots) into a frequency table.

The set of partials is checked against the snapshots' plans before anything is read:
a missing range, an unexpected file or a partial that does not decode fails the merge,
and no table is published. So do snapshots hashed with different normalizations,
whose keys do not designate the same lines. Once merged, a count greater than the number of documents
of the set means that some documents were counted twice, which fails the merge too.

Partials are merged in memory when they fit the memory budget. Otherwise they are
reduced as a tree: groups of `fan_in` sorted partials are k-way merged into
intermediate runs (in parallel), until at most `fan_in` runs remain, which are
merged into the table. Either way the table is sorted by key, so its bytes
do not depend on the order in which partials are given.
!*/
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::io::artifact::{ArtifactKind, ArtifactReader, ArtifactWriter, Entry};
use crate::io::layout::parse_partial_filename;
use crate::io::writer::write_json;
use crate::io::WorkDir;
use crate::normalize::{LineKey, NormalizeOptions};
use crate::processing::kway::KWayMerge;
use crate::processing::plan::ShardPlan;

/// Estimated resident size of a merged entry (hash map entry and final sorted copy).
const RESIDENT_ENTRY_BYTES: u64 = 32;

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub memory_budget: u64,
    pub fan_in: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    Resident,
    Tree,
}

/// A validated partial.
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub snapshot: String,
    pub range: usize,
    pub path: PathBuf,
    pub documents: u64,
    pub entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPartial {
    pub snapshot: String,
    pub range: usize,
    pub documents: u64,
    pub entries: u64,
    pub sha256: String,
}

/// Description of a table, saved next to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub snapshots: Vec<String>,
    /// Normalization of every partial, which annotation must use too.
    pub normalize: NormalizeOptions,
    pub partials: Vec<ManifestPartial>,
    pub documents: u64,
    pub entries: u64,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let f = File::open(path).map_err(|e| {
            Error::Custom(format!("could not open manifest {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeStats {
    pub partials: u64,
    pub documents: u64,
    pub input_entries: u64,
    pub entries: u64,
    pub mode: MergeMode,
    pub rounds: u32,
}

fn is_leftover(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".tmp") || name.ends_with(".spill")
}

/// List and check the partials of a snapshot against its plan.
pub fn collect_inputs(work: &WorkDir, plan: &ShardPlan) -> Result<Vec<MergeInput>, Error> {
    let snapshot = plan.snapshot.as_str();
    let expected = plan.num_ranges();

    let mut found: Vec<Option<PathBuf>> = vec![None; expected];
    let partials_dir = work.partials_dir(snapshot);
    if partials_dir.exists() {
        for entry in std::fs::read_dir(&partials_dir)? {
            let path = entry?.path();
            if is_leftover(&path) {
                warn!("[{}] ignoring leftover {:?}", snapshot, path);
                continue;
            }
            let range = parse_partial_filename(&path).ok_or_else(|| {
                Error::MergeInconsistency(format!(
                    "[{}] unexpected file among partials: {:?}",
                    snapshot, path
                ))
            })?;
            if range >= expected {
                return Err(Error::MergeInconsistency(format!(
                    "[{}] partial of range {} is outside of the plan ({} ranges)",
                    snapshot, range, expected
                )));
            }
            found[range] = Some(path);
        }
    }

    let missing: Vec<usize> = (0..expected).filter(|r| found[*r].is_none()).collect();
    if let Some(first) = missing.first() {
        for range in &missing {
            error!("[{}] missing partial for range {}", snapshot, range);
        }
        return Err(Error::MissingShardArtifact {
            snapshot: snapshot.to_string(),
            range: *first,
        });
    }

    found
        .into_iter()
        .enumerate()
        .filter_map(|(range, path)| path.map(|p| (range, p)))
        .map(|(range, path)| {
            let reader = ArtifactReader::open(&path)?;
            let info = reader.info();
            if info.kind != ArtifactKind::Partial
                || info.name != snapshot
                || info.range != Some(range as u32)
            {
                return Err(Error::MergeInconsistency(format!(
                    "{:?} holds {:?} {} range {:?}, expected partial {} range {}",
                    path, info.kind, info.name, info.range, snapshot, range
                )));
            }
            Ok(MergeInput {
                snapshot: snapshot.to_string(),
                range,
                path,
                documents: info.documents,
                entries: info.entries,
            })
        })
        .collect()
}

/// Writes table entries, checking that no count exceeds the number of documents.
fn write_table<I>(entries: I, dst: &Path, name: &str, documents: u64) -> Result<u64, Error>
where
    I: Iterator<Item = Result<Entry, Error>>,
{
    let mut writer = ArtifactWriter::create(dst, ArtifactKind::Table, name, None)?;
    for entry in entries {
        let (key, count) = entry?;
        if count as u64 > documents {
            return Err(Error::MergeInconsistency(format!(
                "[{}] key {:016x} is counted in {} documents out of {}: some partials were counted more than once",
                name, key, count, documents
            )));
        }
        writer.push(key, count)?;
    }
    writer.finish(documents)
}

fn merge_resident(paths: &[PathBuf]) -> Result<Vec<Entry>, Error> {
    let mut counts: HashMap<LineKey, u32> = HashMap::new();
    for path in paths {
        for entry in ArtifactReader::open(path)? {
            let (key, count) = entry?;
            let total = counts.entry(key).or_insert(0);
            *total = total.checked_add(count).ok_or_else(|| {
                Error::MergeInconsistency(format!("count overflow for key {:016x}", key))
            })?;
        }
    }
    let mut entries: Vec<Entry> = counts.into_iter().collect();
    entries.sort_unstable_by_key(|(key, _)| *key);
    Ok(entries)
}

fn merge_runs(paths: &[PathBuf], dst: &Path, name: &str, index: u32) -> Result<(), Error> {
    let readers = paths
        .iter()
        .map(|p| ArtifactReader::open(p))
        .collect::<Result<Vec<_>, Error>>()?;
    let mut writer = ArtifactWriter::create(dst, ArtifactKind::Partial, name, Some(index))?;
    for entry in KWayMerge::new(readers) {
        let (key, count) = entry?;
        writer.push(key, count)?;
    }
    writer.finish(0)?;
    Ok(())
}

/// Reduce partials as a tree until at most `fan_in` runs remain.
/// Returns the remaining runs and the number of rounds.
fn reduce_runs(
    paths: &[PathBuf],
    name: &str,
    tmp_dir: &Path,
    fan_in: usize,
) -> Result<(Vec<PathBuf>, u32), Error> {
    let mut level = paths.to_vec();
    let mut round = 0u32;
    while level.len() > fan_in {
        let groups: Vec<Vec<PathBuf>> = level.chunks(fan_in).map(|c| c.to_vec()).collect();
        debug!(
            "[{}] merge round {}: {} runs into {}",
            name,
            round,
            level.len(),
            groups.len()
        );
        let next = groups
            .into_par_iter()
            .enumerate()
            .map(|(idx, group)| {
                let dst = tmp_dir.join(format!("round{:02}_{:05}.bin", round, idx));
                merge_runs(&group, &dst, name, idx as u32)?;
                Ok(dst)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        // intermediate runs of the previous round are no longer needed
        if round > 0 {
            for path in &level {
                std::fs::remove_file(path)?;
            }
        }
        level = next;
        round += 1;
    }
    Ok((level, round))
}

/// Merge explicit partial files into a table at `dst`.
///
/// `tmp_dir` receives intermediate runs and is removed afterwards.
pub fn merge_files(
    paths: &[PathBuf],
    dst: &Path,
    name: &str,
    tmp_dir: &Path,
    options: &MergeOptions,
) -> Result<MergeStats, Error> {
    if options.fan_in < 2 {
        return Err(Error::Custom(format!(
            "fan_in must be at least 2 (got {})",
            options.fan_in
        )));
    }

    let mut documents = 0u64;
    let mut input_entries = 0u64;
    for path in paths {
        let reader = ArtifactReader::open(path)?;
        documents += reader.info().documents;
        input_entries += reader.info().entries;
    }

    let resident = input_entries.saturating_mul(RESIDENT_ENTRY_BYTES) <= options.memory_budget;
    let (mode, rounds, entries) = if resident {
        debug!("[{}] merging {} entries in memory", name, input_entries);
        let merged = merge_resident(paths)?;
        let entries = write_table(merged.into_iter().map(Ok), dst, name, documents)?;
        (MergeMode::Resident, 0, entries)
    } else {
        info!(
            "[{}] {} entries exceed the memory budget, merging as a tree (fan in {})",
            name, input_entries, options.fan_in
        );
        if tmp_dir.exists() {
            std::fs::remove_dir_all(tmp_dir)?;
        }
        std::fs::create_dir_all(tmp_dir)?;
        let result = reduce_runs(paths, name, tmp_dir, options.fan_in).and_then(|(runs, rounds)| {
            let readers = runs
                .iter()
                .map(|p| ArtifactReader::open(p))
                .collect::<Result<Vec<_>, Error>>()?;
            let entries = write_table(KWayMerge::new(readers), dst, name, documents)?;
            Ok((rounds, entries))
        });
        std::fs::remove_dir_all(tmp_dir)?;
        let (rounds, entries) = result?;
        (MergeMode::Tree, rounds, entries)
    };

    Ok(MergeStats {
        partials: paths.len() as u64,
        documents,
        input_entries,
        entries,
        mode,
        rounds,
    })
}

/// Compute the sha256 of a file. See [crate::io::artifact] for integrity checks of the content.
pub fn sha256_file(path: &Path) -> Result<String, Error> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut f, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Merge every partial of `snapshots` into the table `name`, and write its manifest.
pub fn merge(
    work: &WorkDir,
    name: &str,
    snapshots: &[String],
    options: &MergeOptions,
) -> Result<MergeStats, Error> {
    let table = work.table_path(name);
    let manifest_path = work.manifest_path(name);
    for stale in [&table, &manifest_path] {
        if stale.exists() {
            info!("[{}] removing previous {:?}", name, stale);
            std::fs::remove_file(stale)?;
        }
    }

    if let Some(dup) = snapshots.iter().duplicates().next() {
        return Err(Error::MergeInconsistency(format!(
            "[{}] snapshot {} is listed twice",
            name, dup
        )));
    }

    let plans = snapshots
        .iter()
        .map(|snapshot| ShardPlan::load(&work.plan_path(snapshot)))
        .collect::<Result<Vec<_>, Error>>()?;
    let normalize = match plans.first() {
        Some(plan) => plan.normalize.clone(),
        None => return Err(Error::Custom(format!("[{}] no snapshot to merge", name))),
    };
    if let Some(other) = plans.iter().find(|plan| plan.normalize != normalize) {
        return Err(Error::MergeInconsistency(format!(
            "[{}] snapshot {} is hashed with normalization {:?}, snapshot {} with {:?}",
            name, plans[0].snapshot, normalize, other.snapshot, other.normalize
        )));
    }

    let mut inputs = Vec::new();
    for plan in &plans {
        inputs.extend(collect_inputs(work, plan)?);
    }
    info!(
        "[{}] merging {} partials of {} snapshots",
        name,
        inputs.len(),
        snapshots.len()
    );

    let paths: Vec<PathBuf> = inputs.iter().map(|i| i.path.clone()).collect();
    let stats = merge_files(&paths, &table, name, &work.merge_tmp_dir(name), options)?;

    let manifest = inputs
        .par_iter()
        .map(|input| {
            Ok(ManifestPartial {
                snapshot: input.snapshot.clone(),
                range: input.range,
                documents: input.documents,
                entries: input.entries,
                sha256: sha256_file(&input.path)?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()
        .map(|partials| Manifest {
            name: name.to_string(),
            snapshots: snapshots.to_vec(),
            normalize,
            partials,
            documents: stats.documents,
            entries: stats.entries,
        })
        .and_then(|manifest| write_json(&manifest_path, &manifest));
    if let Err(e) = manifest {
        let _ = std::fs::remove_file(&table);
        return Err(e);
    }

    info!(
        "[{}] table has {} entries over {} documents ({:?}, {} rounds)",
        name, stats.entries, stats.documents, stats.mode, stats.rounds
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::artifact::write_all;

    fn partial(dir: &Path, range: u32, entries: &[Entry], documents: u64) -> PathBuf {
        let path = dir.join(format!("range_{:05}.bin", range));
        write_all(&path, ArtifactKind::Partial, "s", Some(range), entries, documents).unwrap();
        path
    }

    fn read(path: &Path) -> Vec<Entry> {
        ArtifactReader::open(path).unwrap().read_all().unwrap().1
    }

    #[test]
    fn resident_and_tree_agree() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..7u32)
            .map(|r| {
                let entries: Vec<Entry> = (0..10u64).map(|k| (k * (r as u64 + 1), 1)).collect();
                partial(dir.path(), r, &entries, 10)
            })
            .collect();

        let resident = dir.path().join("resident.bin");
        let stats = merge_files(
            &paths,
            &resident,
            "t",
            &dir.path().join("tmp"),
            &MergeOptions {
                memory_budget: u64::MAX,
                fan_in: 16,
            },
        )
        .unwrap();
        assert_eq!(stats.mode, MergeMode::Resident);
        assert_eq!(stats.documents, 70);

        let tree = dir.path().join("tree.bin");
        let stats = merge_files(
            &paths,
            &tree,
            "t",
            &dir.path().join("tmp"),
            &MergeOptions {
                memory_budget: 0,
                fan_in: 2,
            },
        )
        .unwrap();
        assert_eq!(stats.mode, MergeMode::Tree);
        assert!(stats.rounds >= 2);
        assert!(!dir.path().join("tmp").exists());

        assert_eq!(std::fs::read(&resident).unwrap(), std::fs::read(&tree).unwrap());
        let merged = read(&tree);
        // key 0 is in every partial
        assert_eq!(merged[0], (0, 7));
    }

    #[test]
    fn implausible_counts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = partial(dir.path(), 0, &[(1, 2)], 2);
        let dst = dir.path().join("table.bin");
        // 3 documents in total, but key 1 is counted 5 times
        let b = partial(dir.path(), 1, &[(1, 3)], 1);
        let res = merge_files(
            &[a, b],
            &dst,
            "t",
            &dir.path().join("tmp"),
            &MergeOptions {
                memory_budget: u64::MAX,
                fan_in: 2,
            },
        );
        assert!(matches!(res, Err(Error::MergeInconsistency(_))));
        assert!(!dst.exists());
    }
}
