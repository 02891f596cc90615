//! Snapshot list files.
//!
//! One snapshot identifier per line, in processing order.
//! Blank lines and `#` comments are ignored.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::Error;

/// Read an ordered list of snapshot identifiers.
pub fn from_path(path: &Path) -> Result<Vec<String>, Error> {
    let f = File::open(path)?;
    from_reader(f)
}

pub fn from_reader<R: Read>(r: R) -> Result<Vec<String>, Error> {
    let mut seen = HashSet::new();
    let mut snapshots = Vec::new();
    for line in BufReader::new(r).lines() {
        let line = line?;
        let snapshot = line.trim();
        if snapshot.is_empty() || snapshot.starts_with('#') {
            continue;
        }
        if !seen.insert(snapshot.to_string()) {
            return Err(Error::Custom(format!(
                "snapshot {} is listed twice",
                snapshot
            )));
        }
        snapshots.push(snapshot.to_string());
    }
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_skips_comments() {
        let list = "# english snapshots\n2019-04\n\n  2021-04  \n2017-13\n";
        let snapshots = from_reader(list.as_bytes()).unwrap();
        assert_eq!(snapshots, vec!["2019-04", "2021-04", "2017-13"]);
    }

    #[test]
    fn rejects_duplicates() {
        let list = "2019-04\n2019-04\n";
        assert!(from_reader(list.as_bytes()).is_err());
    }
}
