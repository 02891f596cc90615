/*! JSON lines reader.

Yields one item per non blank line. A line that does not decode is reported as
[Error::MalformedDocument] and reading continues with the next line; any other IO error
ends the iteration after being reported once.
!*/
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::marker::PhantomData;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Open a file for reading, decompressing it if it ends in `.gz`.
pub fn open(path: &Path) -> Result<Box<dyn Read + Send>, Error> {
    let f = File::open(path)?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        // corpus files are usually multi member gzip files
        Ok(Box::new(MultiGzDecoder::new(f)))
    } else {
        Ok(Box::new(f))
    }
}

#[derive(Debug)]
pub struct JsonlReader<T, R>
where
    R: Read,
{
    lines: Lines<BufReader<R>>,
    source: String,
    line_no: usize,
    done: bool,
    item: PhantomData<T>,
}

impl<T> JsonlReader<T, Box<dyn Read + Send>> {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let reader = open(path)?;
        Ok(Self::new(reader, path.to_string_lossy().into_owned()))
    }
}

impl<T, R: Read> JsonlReader<T, R> {
    pub fn new(reader: R, source: String) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            source,
            line_no: 0,
            done: false,
            item: PhantomData,
        }
    }

    /// 1-based number of the last line read.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// `source:line` of the last line read.
    pub fn location(&self) -> String {
        format!("{}:{}", self.source, self.line_no)
    }
}

impl<T, R> Iterator for JsonlReader<T, R>
where
    T: DeserializeOwned,
    R: Read,
{
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                None => return None,
                // invalid UTF-8 only spoils the current line
                Some(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    self.line_no += 1;
                    return Some(Err(Error::MalformedDocument {
                        location: self.location(),
                        reason: e.to_string(),
                    }));
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
                Some(Ok(line)) => {
                    self.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str::<T>(&line).map_err(|e| {
                        Error::MalformedDocument {
                            location: self.location(),
                            reason: e.to_string(),
                        }
                    }));
                }
            }
        }
    }
}
