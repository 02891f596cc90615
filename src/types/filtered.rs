//! Filtered documents, handed over to downstream quality stages.
use serde::{Deserialize, Serialize};

use crate::filtering::Band;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredDocument {
    pub id: String,
    pub snapshot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

/// A kept line that its band asked to flag.
/// `position` refers to the line in the count info document, not in the filtered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub position: usize,
    pub band: Band,
}
