//! Corpus document reader.
use std::io::Read;
use std::path::Path;

use super::jsonl::JsonlReader;
use crate::error::Error;
use crate::types::{Document, DocumentSer};

/// Iterates over the [Document]s of a corpus file.
///
/// Records without an identifier get `<file>:<line>` as their id.
pub struct DocReader<R: Read> {
    inner: JsonlReader<DocumentSer, R>,
    snapshot: String,
}

impl DocReader<Box<dyn Read + Send>> {
    pub fn from_path(src: &Path, snapshot: &str) -> Result<Self, Error> {
        Ok(Self {
            inner: JsonlReader::from_path(src)?,
            snapshot: snapshot.to_string(),
        })
    }
}

impl<R: Read> DocReader<R> {
    pub fn new(reader: R, source: String, snapshot: &str) -> Self {
        Self {
            inner: JsonlReader::new(reader, source),
            snapshot: snapshot.to_string(),
        }
    }
}

impl<R: Read> Iterator for DocReader<R> {
    type Item = Result<Document, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let ser = match self.inner.next()? {
            Ok(ser) => ser,
            Err(e) => return Some(Err(e)),
        };
        let location = self.inner.location();
        let doc = Document::from_ser(ser, &self.snapshot, || location.clone())
            .map_err(|reason| Error::MalformedDocument { location, reason });
        Some(doc)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_documents() {
        let data = r#"{"id": "a", "text": "hello\nworld"}
{"text": "no id here"}
{"id": "c"}
{"id": "d", "lines": ["x"], "language": "ko"}
"#;
        let reader = DocReader::new(Cursor::new(data), "f.jsonl".to_string(), "2019-04");
        let docs: Vec<_> = reader.collect();
        assert_eq!(docs.len(), 4);

        let first = docs[0].as_ref().unwrap();
        assert_eq!(first.id(), "a");
        assert_eq!(first.lines(), &["hello", "world"]);

        assert_eq!(docs[1].as_ref().unwrap().id(), "f.jsonl:2");
        assert!(matches!(docs[2], Err(Error::MalformedDocument { .. })));
        assert_eq!(docs[3].as_ref().unwrap().language(), Some("ko"));
    }
}
