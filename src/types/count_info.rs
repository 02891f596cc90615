//! Count info: documents whose lines carry their global frequency.
//!
//! Written once by the annotator, read by every extraction run.
use serde::{Deserialize, Serialize};

/// A document annotated with the global count of each of its lines.
///
/// `counts[i]` is the count of `lines[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountInfoDocument {
    pub id: String,
    pub snapshot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub lines: Vec<String>,
    pub counts: Vec<u32>,
}

/// One line of a [CountInfoDocument].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountInfoRecord<'a> {
    pub document_id: &'a str,
    pub position: usize,
    pub text: &'a str,
    pub count: u32,
}

impl CountInfoDocument {
    /// Check that there is exactly one count per line.
    pub fn validate(&self) -> Result<(), String> {
        if self.lines.len() != self.counts.len() {
            return Err(format!(
                "{} lines but {} counts",
                self.lines.len(),
                self.counts.len()
            ));
        }
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = CountInfoRecord<'_>> {
        self.lines
            .iter()
            .zip(&self.counts)
            .enumerate()
            .map(move |(position, (text, count))| CountInfoRecord {
                document_id: &self.id,
                position,
                text,
                count: *count,
            })
    }
}
