//! Command line arguments and parameters management/parsing.
use std::ops::Range;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use structopt::StructOpt;

use linefreq::config::{ByteSize, Config};
use linefreq::error::Error;
use linefreq::filtering::{BandRules, FilterPolicy};
use linefreq::snapshots;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "linefreq",
    about = "Cross-document line frequencies and boilerplate filtering of web corpora."
)]
pub struct Linefreq {
    #[structopt(
        long,
        global = true,
        parse(from_os_str),
        help = "JSON file overriding default settings"
    )]
    pub config: Option<PathBuf>,
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, StructOpt)]
/// Holds every command that is callable by the `linefreq` command.
pub enum Command {
    #[structopt(about = "Count line frequencies of shard ranges")]
    Hash(Hash),
    #[structopt(about = "List shard ranges with no partial")]
    Missing(Missing),
    #[structopt(about = "Merge partials into a frequency table")]
    Merge(Merge),
    #[structopt(about = "Annotate corpus lines with their frequency")]
    Annotate(Annotate),
    #[structopt(about = "Filter annotated documents with one or more policies")]
    Extract(Extract),
}

#[derive(Debug, StructOpt)]
pub struct SnapshotArgs {
    #[structopt(long = "snapshot", help = "snapshot identifier (repeatable)")]
    pub snapshots: Vec<String>,
    #[structopt(
        long,
        parse(from_os_str),
        help = "file listing snapshot identifiers, one per line"
    )]
    pub snapshots_file: Option<PathBuf>,
}

impl SnapshotArgs {
    /// Snapshots given with `--snapshot`, then the ones of the snapshots file.
    pub fn resolve(&self) -> Result<Vec<String>, Error> {
        let mut all = self.snapshots.clone();
        if let Some(path) = &self.snapshots_file {
            all.extend(snapshots::from_path(path)?);
        }
        if all.is_empty() {
            return Err(Error::Custom(
                "no snapshot given: use --snapshot or --snapshots-file".to_string(),
            ));
        }
        if let Some(snapshot) = all.iter().duplicates().next() {
            return Err(Error::Custom(format!("snapshot {} is given twice", snapshot)));
        }
        Ok(all)
    }
}

#[derive(Debug, StructOpt)]
pub struct Hash {
    #[structopt(parse(from_os_str), help = "corpus location (one directory per snapshot)")]
    pub src: PathBuf,
    #[structopt(parse(from_os_str), help = "work directory")]
    pub work: PathBuf,
    #[structopt(flatten)]
    pub snapshots: SnapshotArgs,
    #[structopt(long, help = "number of corpus files per range, for new plans")]
    pub files_per_range: Option<usize>,
    #[structopt(
        long,
        parse(try_from_str = parse_range),
        help = "only hash these ranges (A..B, end excluded, or A)"
    )]
    pub ranges: Option<Range<usize>>,
    #[structopt(long, help = "memory budget (e.g. 512M, 4G)")]
    pub memory_budget: Option<ByteSize>,
    #[structopt(long, help = "hash ranges that already have a partial")]
    pub force: bool,
}

#[derive(Debug, StructOpt)]
pub struct Missing {
    #[structopt(parse(from_os_str), help = "work directory")]
    pub work: PathBuf,
    #[structopt(flatten)]
    pub snapshots: SnapshotArgs,
}

#[derive(Debug, StructOpt)]
pub struct Merge {
    #[structopt(parse(from_os_str), help = "work directory")]
    pub work: PathBuf,
    #[structopt(flatten)]
    pub snapshots: SnapshotArgs,
    #[structopt(long, help = "table name (defaults to the snapshots joined by '+')")]
    pub name: Option<String>,
    #[structopt(long, help = "memory budget (e.g. 512M, 4G)")]
    pub memory_budget: Option<ByteSize>,
    #[structopt(long, help = "number of runs merged at once when out of memory budget")]
    pub fan_in: Option<usize>,
}

#[derive(Debug, StructOpt)]
pub struct Annotate {
    #[structopt(parse(from_os_str), help = "work directory")]
    pub work: PathBuf,
    #[structopt(flatten)]
    pub snapshots: SnapshotArgs,
    #[structopt(long, help = "table name (defaults to the snapshots joined by '+')")]
    pub name: Option<String>,
    #[structopt(long, help = "memory budget (e.g. 512M, 4G)")]
    pub memory_budget: Option<ByteSize>,
    #[structopt(long, help = "number of documents looked up together")]
    pub batch_size: Option<usize>,
    #[structopt(long, help = "annotate files that already have count info")]
    pub force: bool,
}

#[derive(Debug, StructOpt)]
pub struct Extract {
    #[structopt(parse(from_os_str), help = "work directory")]
    pub work: PathBuf,
    #[structopt(long, help = "table name")]
    pub name: String,
    #[structopt(
        long = "policy",
        help = "ptf:<k> or pld:<r>,<y>,<g>[:banded] (repeatable)"
    )]
    pub policies: Vec<FilterPolicy>,
    #[structopt(
        long,
        use_delimiter = true,
        help = "add a ptf policy for each of these thresholds"
    )]
    pub sweep_k: Vec<i64>,
    #[structopt(
        long,
        use_delimiter = true,
        help = "also run each policy refined by punctuation, with these gaps"
    )]
    pub punct_gap: Vec<usize>,
    #[structopt(long, help = "pld band rules, e.g. keep/g,annotate/y,annotate/y,drop/r")]
    pub band_rules: Option<BandRules>,
}

/// Parse `A..B` or `A`.
pub fn parse_range(s: &str) -> Result<Range<usize>, Error> {
    match s.split_once("..") {
        Some((start, end)) => {
            let (start, end) = (start.trim().parse()?, end.trim().parse()?);
            if start > end {
                return Err(Error::Custom(format!("empty range {}", s)));
            }
            Ok(start..end)
        }
        None => {
            let idx: usize = s.trim().parse()?;
            Ok(idx..idx + 1)
        }
    }
}

/// Load the config file if any, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    match path {
        Some(path) => Config::from_path(path),
        None => Ok(Config::default()),
    }
}

/// Table name given, or derived from the snapshots.
pub fn table_name(name: Option<String>, snapshots: &[String]) -> String {
    name.unwrap_or_else(|| snapshots.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(parse_range("3..7").unwrap(), 3..7);
        assert_eq!(parse_range("4").unwrap(), 4..5);
        assert!(parse_range("7..3").is_err());
        assert!(parse_range("a..3").is_err());
    }

    #[test]
    fn extract_args() {
        let opt = Linefreq::from_iter_safe(&[
            "linefreq",
            "extract",
            "/work",
            "--name",
            "2019-04",
            "--policy",
            "pld:2,50,1000",
            "--sweep-k",
            "1,3,5",
            "--punct-gap",
            "3",
        ])
        .unwrap();
        match opt.cmd {
            Command::Extract(e) => {
                assert_eq!(e.policies.len(), 1);
                assert_eq!(e.sweep_k, vec![1, 3, 5]);
                assert_eq!(e.punct_gap, vec![3]);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(Linefreq::from_iter_safe(&[
            "linefreq", "extract", "/work", "--name", "t", "--policy", "pld:5,2,1"
        ])
        .is_err());
    }
}
