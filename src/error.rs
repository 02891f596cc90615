//! Error enum
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Serde(serde_json::Error),
    Csv(csv::Error),
    Encode(bincode::error::EncodeError),
    Glob(glob::GlobError),
    GlobPattern(glob::PatternError),
    Regex(regex::Error),
    ParseInt(ParseIntError),
    /// An expected shard partial is not on disk.
    MissingShardArtifact {
        snapshot: String,
        range: usize,
    },
    /// A shard partial (or table) could not be decoded.
    CorruptShardArtifact {
        path: PathBuf,
        reason: String,
    },
    /// Counts that cannot be right: a partial merged twice, overflow, count above document total.
    MergeInconsistency(String),
    /// Rejected filter policy parameters.
    InvalidPolicy(String),
    /// A single document that could not be decoded. Logged and counted, never fatal to a stage.
    MalformedDocument {
        location: String,
        reason: String,
    },
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Serde(e) => write!(f, "json error: {}", e),
            Error::Csv(e) => write!(f, "csv error: {}", e),
            Error::Encode(e) => write!(f, "encoding error: {}", e),
            Error::Glob(e) => write!(f, "glob error: {}", e),
            Error::GlobPattern(e) => write!(f, "glob pattern error: {}", e),
            Error::Regex(e) => write!(f, "regex error: {}", e),
            Error::ParseInt(e) => write!(f, "integer parsing error: {}", e),
            Error::MissingShardArtifact { snapshot, range } => write!(
                f,
                "missing shard partial for snapshot {} range {}",
                snapshot, range
            ),
            Error::CorruptShardArtifact { path, reason } => {
                write!(f, "corrupt shard artifact {:?}: {}", path, reason)
            }
            Error::MergeInconsistency(msg) => write!(f, "merge inconsistency: {}", msg),
            Error::InvalidPolicy(msg) => write!(f, "invalid policy configuration: {}", msg),
            Error::MalformedDocument { location, reason } => {
                write!(f, "malformed document at {}: {}", location, reason)
            }
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Error {
        Error::Csv(e)
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Error {
        Error::Encode(e)
    }
}

impl From<glob::GlobError> for Error {
    fn from(e: glob::GlobError) -> Error {
        Error::Glob(e)
    }
}

impl From<glob::PatternError> for Error {
    fn from(e: glob::PatternError) -> Error {
        Error::GlobPattern(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Error {
        Error::Regex(e)
    }
}

impl From<ParseIntError> for Error {
    fn from(e: ParseIntError) -> Error {
        Error::ParseInt(e)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
