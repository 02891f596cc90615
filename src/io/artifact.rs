/*! Frequency artifacts: shard partials and merged tables.

Both are sorted `(key, count)` sequences, bincode encoded with fixed size little endian integers:

```text
header     magic [u8; 4] "LFQP" (partial) | "LFQT" (table)
           version u16
           name (u64 length, then UTF-8 bytes: snapshot id or table name)
           range u32, u32::MAX for tables
entries    (key u64, count u32)*   strictly increasing keys, counts > 0
footer     documents u64, entries u64
checksum   u64   XxHash64 (seed 0) of every preceding byte
```

Entries have a fixed size, so their number follows from the file length and any entry can be
reached by seeking. Counts live in the footer so that writers can stream entries without knowing
their number upfront.
Readers stream entries too, and only report the checksum once the last entry has been read:
consumers must drain a reader (or check for the final `Err`) before trusting what they read.
!*/
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bincode::{Decode, Encode};
use log::warn;
use twox_hash::XxHash64;

use crate::error::Error;
use crate::io::writer::tmp_path;
use crate::normalize::LineKey;

pub const VERSION: u16 = 2;
/// Encoded size of an entry.
pub const ENTRY_LEN: u64 = 12;
/// Encoded size of the footer and checksum.
const FOOTER_LEN: u64 = 24;
const NO_RANGE: u32 = u32::MAX;
const MAX_NAME_LEN: usize = 4096;
/// Upper bound of a single decoded value, so that a corrupt name length cannot allocate.
const DECODE_LIMIT: usize = MAX_NAME_LEN + 64;

/// A line key and its count.
pub type Entry = (LineKey, u32);

fn codec() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<DECODE_LIMIT>()
}

#[derive(Debug, Encode, Decode)]
struct Header {
    magic: [u8; 4],
    version: u16,
    name: String,
    range: u32,
}

#[derive(Debug, Encode, Decode)]
struct Footer {
    documents: u64,
    entries: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Partial,
    Table,
}

impl ArtifactKind {
    fn magic(&self) -> [u8; 4] {
        match self {
            ArtifactKind::Partial => *b"LFQP",
            ArtifactKind::Table => *b"LFQT",
        }
    }

    fn from_magic(magic: &[u8; 4]) -> Option<Self> {
        match magic {
            b"LFQP" => Some(ArtifactKind::Partial),
            b"LFQT" => Some(ArtifactKind::Table),
            _ => None,
        }
    }
}

/// Header and footer content of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub kind: ArtifactKind,
    pub name: String,
    pub range: Option<u32>,
    pub documents: u64,
    pub entries: u64,
}

fn corrupt(path: &Path, reason: impl Into<String>) -> Error {
    Error::CorruptShardArtifact {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Hashes every byte that goes through it, and counts them.
struct Checksummed<T> {
    inner: T,
    hasher: XxHash64,
    bytes: u64,
}

impl<T> Checksummed<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            hasher: XxHash64::with_seed(0),
            bytes: 0,
        }
    }
}

impl<W: Write> Write for Checksummed<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.write(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<R: Read> Read for Checksummed<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.write(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Streaming artifact writer. Entries must be pushed in strictly increasing key order.
pub struct ArtifactWriter {
    out: Option<Checksummed<BufWriter<File>>>,
    tmp: PathBuf,
    dst: PathBuf,
    entries: u64,
    last_key: Option<LineKey>,
}

impl ArtifactWriter {
    pub fn create(
        dst: &Path,
        kind: ArtifactKind,
        name: &str,
        range: Option<u32>,
    ) -> Result<Self, Error> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::Custom(format!("artifact name too long: {}", name)));
        }
        if range == Some(NO_RANGE) {
            return Err(Error::Custom(format!("range index {} is reserved", NO_RANGE)));
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = tmp_path(dst);
        let mut writer = Self {
            out: Some(Checksummed::new(BufWriter::new(File::create(&tmp)?))),
            tmp,
            dst: dst.to_path_buf(),
            entries: 0,
            last_key: None,
        };
        writer.put(Header {
            magic: kind.magic(),
            version: VERSION,
            name: name.to_string(),
            range: range.unwrap_or(NO_RANGE),
        })?;
        Ok(writer)
    }

    fn put<E: Encode>(&mut self, value: E) -> Result<(), Error> {
        match self.out.as_mut() {
            Some(out) => {
                bincode::encode_into_std_write(value, out, codec())?;
                Ok(())
            }
            None => Err(Error::Custom(format!("writer for {:?} is closed", self.dst))),
        }
    }

    pub fn push(&mut self, key: LineKey, count: u32) -> Result<(), Error> {
        if count == 0 {
            return Err(Error::MergeInconsistency(format!(
                "key {:016x} has a zero count",
                key
            )));
        }
        if let Some(last) = self.last_key {
            if key <= last {
                return Err(Error::Custom(format!(
                    "keys must be strictly increasing ({:016x} after {:016x})",
                    key, last
                )));
            }
        }
        self.put((key, count))?;
        self.last_key = Some(key);
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Write the footer and move the file to its destination.
    pub fn finish(mut self, documents: u64) -> Result<u64, Error> {
        let entries = self.entries;
        self.put(Footer { documents, entries })?;

        let mut out = match self.out.take() {
            Some(out) => out,
            None => return Err(Error::Custom(format!("writer for {:?} is closed", self.dst))),
        };
        let checksum = out.hasher.finish();
        let published = bincode::encode_into_std_write(checksum, &mut out.inner, codec())
            .map_err(Error::from)
            .and_then(|_| {
                out.inner.flush()?;
                out.inner.get_ref().sync_all()?;
                std::fs::rename(&self.tmp, &self.dst)?;
                Ok(())
            });
        if let Err(e) = published {
            let _ = std::fs::remove_file(&self.tmp);
            return Err(e);
        }
        Ok(entries)
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        if self.out.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.tmp) {
                warn!("could not remove unfinished artifact {:?}: {}", self.tmp, e);
            }
        }
    }
}

/// Streaming artifact reader, iterating over entries.
///
/// Errors are [Error::CorruptShardArtifact] naming the file.
pub struct ArtifactReader {
    inner: Checksummed<BufReader<File>>,
    info: ArtifactInfo,
    path: PathBuf,
    header_len: u64,
    remaining: u64,
    checksum: u64,
    last_key: Option<LineKey>,
    done: bool,
}

impl ArtifactReader {
    /// Open an artifact and decode its header and footer.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut inner = Checksummed::new(BufReader::new(file));

        let header: Header = bincode::decode_from_std_read(&mut inner, codec())
            .map_err(|e| corrupt(path, format!("bad header: {}", e)))?;
        let kind = ArtifactKind::from_magic(&header.magic)
            .ok_or_else(|| corrupt(path, "bad magic number"))?;
        if header.version != VERSION {
            return Err(corrupt(
                path,
                format!("unsupported version {}", header.version),
            ));
        }
        let range = match header.range {
            NO_RANGE => None,
            r => Some(r),
        };

        let header_len = inner.bytes;
        if len < header_len + FOOTER_LEN {
            return Err(corrupt(path, "file is truncated"));
        }
        let body_len = len - header_len - FOOTER_LEN;
        if body_len % ENTRY_LEN != 0 {
            return Err(corrupt(path, "entry section has a partial entry"));
        }

        // the footer is read again through the checksum once entries are drained
        inner.inner.seek(SeekFrom::Start(len - FOOTER_LEN))?;
        let footer: Footer = bincode::decode_from_std_read(&mut inner.inner, codec())
            .map_err(|e| corrupt(path, format!("bad footer: {}", e)))?;
        let checksum: u64 = bincode::decode_from_std_read(&mut inner.inner, codec())
            .map_err(|e| corrupt(path, format!("bad checksum: {}", e)))?;
        if footer.entries != body_len / ENTRY_LEN {
            return Err(corrupt(
                path,
                format!(
                    "footer announces {} entries, file holds {}",
                    footer.entries,
                    body_len / ENTRY_LEN
                ),
            ));
        }
        inner.inner.seek(SeekFrom::Start(header_len))?;

        Ok(Self {
            inner,
            info: ArtifactInfo {
                kind,
                name: header.name,
                range,
                documents: footer.documents,
                entries: footer.entries,
            },
            path: path.to_path_buf(),
            header_len,
            remaining: footer.entries,
            checksum,
            last_key: None,
            done: false,
        })
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first entry.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    fn verify_checksum(&mut self) -> Result<(), Error> {
        let _: Footer = bincode::decode_from_std_read(&mut self.inner, codec())
            .map_err(|e| corrupt(&self.path, format!("bad footer: {}", e)))?;
        if self.inner.hasher.finish() != self.checksum {
            return Err(corrupt(&self.path, "checksum mismatch"));
        }
        Ok(())
    }

    fn read_entry(&mut self) -> Result<Entry, Error> {
        let (key, count) = decode_entry(&mut self.inner, &self.path)?;
        if count == 0 {
            return Err(corrupt(&self.path, format!("zero count for key {:016x}", key)));
        }
        if let Some(last) = self.last_key {
            if key <= last {
                return Err(corrupt(&self.path, "keys are not sorted"));
            }
        }
        self.last_key = Some(key);
        Ok((key, count))
    }

    /// Read every entry, checking the checksum.
    pub fn read_all(mut self) -> Result<(ArtifactInfo, Vec<Entry>), Error> {
        let mut entries = Vec::with_capacity(self.info.entries as usize);
        for entry in &mut self {
            entries.push(entry?);
        }
        Ok((self.info, entries))
    }
}

impl Iterator for ArtifactReader {
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.remaining == 0 {
            self.done = true;
            return match self.verify_checksum() {
                Ok(()) => None,
                Err(e) => Some(Err(e)),
            };
        }
        self.remaining -= 1;
        let entry = self.read_entry();
        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }
}

fn decode_entry<R: Read>(src: &mut R, path: &Path) -> Result<Entry, Error> {
    bincode::decode_from_std_read(src, codec())
        .map_err(|e| corrupt(path, format!("truncated entry: {}", e)))
}

/// Read `count` entries starting at entry `start`, without integrity checks.
///
/// Meant for artifacts that were read through once already. `header_len` comes from
/// [ArtifactReader::header_len].
pub fn read_entries_at<R: Read + Seek>(
    src: &mut R,
    path: &Path,
    header_len: u64,
    start: u64,
    count: u64,
) -> Result<Vec<Entry>, Error> {
    src.seek(SeekFrom::Start(header_len + start * ENTRY_LEN))?;
    (0..count).map(|_| decode_entry(&mut *src, path)).collect()
}

/// Write a whole sorted entry list.
pub fn write_all(
    dst: &Path,
    kind: ArtifactKind,
    name: &str,
    range: Option<u32>,
    entries: &[Entry],
    documents: u64,
) -> Result<u64, Error> {
    let mut writer = ArtifactWriter::create(dst, kind, name, range)?;
    for (key, count) in entries {
        writer.push(*key, *count)?;
    }
    writer.finish(documents)
}
