//! Work directory layout.
//!
//! ```text
//! <work>/hash/<snapshot>/plan.json
//! <work>/hash/<snapshot>/partials/range_00003.bin
//! <work>/tables/<name>/table.bin
//! <work>/tables/<name>/manifest.json
//! <work>/count_info/<name>/table.json
//! <work>/count_info/<name>/<snapshot>/00012.jsonl.gz
//! <work>/extracted/<policy>/<name>/<snapshot>/00012.jsonl.gz
//! <work>/extracted/<policy>/<name>/stats.json
//! <work>/extracted/sweep_<name>.csv
//! ```
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash_dir(&self, snapshot: &str) -> PathBuf {
        self.root.join("hash").join(snapshot)
    }

    pub fn plan_path(&self, snapshot: &str) -> PathBuf {
        self.hash_dir(snapshot).join("plan.json")
    }

    pub fn partials_dir(&self, snapshot: &str) -> PathBuf {
        self.hash_dir(snapshot).join("partials")
    }

    pub fn partial_path(&self, snapshot: &str, range: usize) -> PathBuf {
        self.partials_dir(snapshot).join(partial_filename(range))
    }

    /// Where a range spills sorted runs when it outgrows its memory budget.
    pub fn spill_dir(&self, snapshot: &str, range: usize) -> PathBuf {
        self.partials_dir(snapshot)
            .join(format!("range_{:05}.spill", range))
    }

    pub fn table_dir(&self, name: &str) -> PathBuf {
        self.root.join("tables").join(name)
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.table_dir(name).join("table.bin")
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.table_dir(name).join("manifest.json")
    }

    /// Intermediate runs of a streaming merge.
    pub fn merge_tmp_dir(&self, name: &str) -> PathBuf {
        self.table_dir(name).join("tmp")
    }

    pub fn count_info_dir(&self, name: &str) -> PathBuf {
        self.root.join("count_info").join(name)
    }

    /// Identity of the table the count info was computed against.
    pub fn count_info_stamp_path(&self, name: &str) -> PathBuf {
        self.count_info_dir(name).join("table.json")
    }

    pub fn count_info_path(&self, name: &str, snapshot: &str, file_index: usize) -> PathBuf {
        self.count_info_dir(name)
            .join(snapshot)
            .join(format!("{:05}.jsonl.gz", file_index))
    }

    pub fn extracted_dir(&self, policy: &str, name: &str) -> PathBuf {
        self.root.join("extracted").join(policy).join(name)
    }

    pub fn stats_path(&self, policy: &str, name: &str) -> PathBuf {
        self.extracted_dir(policy, name).join("stats.json")
    }

    pub fn sweep_path(&self, name: &str) -> PathBuf {
        self.root
            .join("extracted")
            .join(format!("sweep_{}.csv", name))
    }
}

pub fn partial_filename(range: usize) -> String {
    format!("range_{:05}.bin", range)
}

/// go from "range_00003.bin" to 3.
pub fn parse_partial_filename(path: &Path) -> Option<usize> {
    path.file_name()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix("range_"))
        .and_then(|s| s.strip_suffix(".bin"))
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_names_round_trip() {
        let work = WorkDir::new("/work");
        let path = work.partial_path("2019-04", 3);
        assert_eq!(
            path,
            PathBuf::from("/work/hash/2019-04/partials/range_00003.bin")
        );
        assert_eq!(parse_partial_filename(&path), Some(3));
        assert_eq!(parse_partial_filename(Path::new("range_00003.bin.tmp")), None);
        assert_eq!(parse_partial_filename(Path::new("plan.json")), None);
    }
}
