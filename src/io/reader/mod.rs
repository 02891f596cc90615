/*! Reading utilities

Corpus files and count info files are both JSON lines, optionally gzipped.
!*/
mod docreader;
mod jsonl;

pub use docreader::DocReader;
pub use jsonl::{open, JsonlReader};

use crate::types::CountInfoDocument;

/// Reader over count info files.
pub type CountInfoReader<R> = JsonlReader<CountInfoDocument, R>;
