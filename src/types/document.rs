//! Corpus documents, as produced by the upstream extraction step.
use serde::{Deserialize, Serialize};

/// A corpus document. Lines keep their order, and a line's position is its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: String,
    snapshot: String,
    language: Option<String>,
    lines: Vec<String>,
}

/// Serialized form of a [Document].
///
/// Content is either a newline separated `text` or a `lines` array.
/// `text` is split on `\n` only: lines keep any `\r`, and a trailing newline ends with an empty line,
/// so that joining lines back gives the original text.
/// The snapshot is not part of the record: it is given by where the file lives.
#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentSer {
    #[serde(default, alias = "WARC-Record-ID", alias = "document_id")]
    pub id: Option<String>,
    #[serde(default, alias = "lang")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<String>>,
}

impl Document {
    pub fn new(id: String, snapshot: String, language: Option<String>, lines: Vec<String>) -> Self {
        Self {
            id,
            snapshot,
            language,
            lines,
        }
    }

    /// Build a document from its serialized form.
    ///
    /// `fallback_id` is used when the record has no identifier.
    /// Returns an error message when the record has no content field.
    pub fn from_ser(
        ser: DocumentSer,
        snapshot: &str,
        fallback_id: impl FnOnce() -> String,
    ) -> Result<Self, String> {
        let lines = match (ser.text, ser.lines) {
            (Some(text), _) => text.split('\n').map(String::from).collect(),
            (None, Some(lines)) => lines,
            (None, None) => return Err("record has neither `text` nor `lines`".to_string()),
        };
        let id = ser.id.unwrap_or_else(fallback_id);

        Ok(Self::new(id, snapshot.to_string(), ser.language, lines))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_parts(self) -> (String, String, Option<String>, Vec<String>) {
        (self.id, self.snapshot, self.language, self.lines)
    }
}
