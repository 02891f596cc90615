//! Shared tunables.
//!
//! Every field has a default. A JSON file can override them, and the command line
//! overrides the file.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::normalize::NormalizeOptions;

/// Default memory budget: 4GiB.
pub const DEFAULT_MEMORY_BUDGET: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Working memory a stage may use for frequency data, in bytes.
    pub memory_budget: ByteSize,
    /// Maximum number of sorted runs merged at once in streaming merges.
    pub fan_in: usize,
    /// Number of documents resolved together by the annotator.
    pub batch_size: usize,
    /// Number of corpus files per shard range for new plans.
    pub files_per_range: usize,
    /// Line normalization, shared by hashing and annotation.
    pub normalize: NormalizeOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_budget: ByteSize(DEFAULT_MEMORY_BUDGET),
            fan_in: 16,
            batch_size: 1000,
            files_per_range: 20,
            normalize: NormalizeOptions::default(),
        }
    }
}

impl Config {
    /// Load a config file. Missing fields take their default value.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let f = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(f))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.fan_in < 2 {
            return Err(Error::Custom(format!(
                "fan_in must be at least 2 (got {})",
                self.fan_in
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Custom("batch_size must be positive".to_string()));
        }
        if self.files_per_range == 0 {
            return Err(Error::Custom("files_per_range must be positive".to_string()));
        }
        Ok(())
    }

    /// Number of (key, count) entries that fit in the memory budget.
    ///
    /// Hash map entries are costed at 32 bytes (key, count, table overhead).
    pub fn max_resident_entries(&self) -> usize {
        ((self.memory_budget.0 / 32) as usize).max(1024)
    }
}

/// A number of bytes, parsed from `1024`, `512K`, `512M`, `4G` or `1T` (powers of 1024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ByteSizeSer", into = "u64")]
pub struct ByteSize(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteSizeSer {
    Num(u64),
    Str(String),
}

impl TryFrom<ByteSizeSer> for ByteSize {
    type Error = Error;
    fn try_from(v: ByteSizeSer) -> Result<Self, Self::Error> {
        match v {
            ByteSizeSer::Num(n) => Ok(ByteSize(n)),
            ByteSizeSer::Str(s) => s.parse(),
        }
    }
}

impl From<ByteSize> for u64 {
    fn from(b: ByteSize) -> Self {
        b.0
    }
}

impl FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, multiplier) = match s.chars().last() {
            Some(c) if c.is_ascii_alphabetic() => {
                let multiplier: u64 = match c.to_ascii_uppercase() {
                    'K' => 1 << 10,
                    'M' => 1 << 20,
                    'G' => 1 << 30,
                    'T' => 1 << 40,
                    _ => return Err(Error::Custom(format!("unknown size suffix in {:?}", s))),
                };
                (&s[..s.len() - 1], multiplier)
            }
            _ => (s, 1),
        };
        let n: u64 = digits.trim().parse()?;
        n.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| Error::Custom(format!("size {:?} overflows", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sizes() {
        assert_eq!("1024".parse::<ByteSize>().unwrap(), ByteSize(1024));
        assert_eq!("4K".parse::<ByteSize>().unwrap(), ByteSize(4096));
        assert_eq!("2m".parse::<ByteSize>().unwrap(), ByteSize(2 * 1024 * 1024));
        assert_eq!(
            "4G".parse::<ByteSize>().unwrap(),
            ByteSize(4 * 1024 * 1024 * 1024)
        );
        assert!("4X".parse::<ByteSize>().is_err());
        assert!("".parse::<ByteSize>().is_err());
    }

    #[test]
    fn partial_config_file() {
        let json = r#"{"memory_budget": "1M", "fan_in": 4}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.memory_budget, ByteSize(1 << 20));
        assert_eq!(config.fan_in, 4);
        assert_eq!(config.batch_size, Config::default().batch_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_fan_in() {
        let config = Config {
            fan_in: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
