/*! Atomic JSON lines writer.

Records are written to `<dst>.tmp` and the file is renamed to `<dst>` by [WriterTrait::finish].
A writer dropped before being finished removes its temporary file, so that `<dst>` either
does not exist or is complete.

Destinations ending in `.gz` are gzip compressed. The gzip header carries no timestamp,
so identical records give byte identical files.
!*/
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::warn;
use serde::Serialize;

use super::WriterTrait;
use crate::error::Error;

enum Sink {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gz(w) => w.flush(),
        }
    }
}

impl Sink {
    fn close(self) -> Result<(), Error> {
        let inner = match self {
            Sink::Plain(w) => w,
            Sink::Gz(w) => w.finish()?,
        };
        let file = inner.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

/// Temporary path of a destination: `<dst>.tmp`.
pub fn tmp_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dst.with_file_name(name)
}

pub struct JsonlWriter<T> {
    sink: Option<Sink>,
    tmp: PathBuf,
    dst: PathBuf,
    nb_records: u64,
    item: PhantomData<T>,
}

impl<T> JsonlWriter<T> {
    /// Create a writer for `dst`, creating parent directories if needed.
    pub fn create(dst: &Path) -> Result<Self, Error> {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(dst);
        let file = BufWriter::new(File::create(&tmp)?);
        let sink = if dst.extension().map_or(false, |ext| ext == "gz") {
            Sink::Gz(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };

        Ok(Self {
            sink: Some(sink),
            tmp,
            dst: dst.to_path_buf(),
            nb_records: 0,
            item: PhantomData,
        })
    }

    pub fn nb_records(&self) -> u64 {
        self.nb_records
    }

    pub fn dst(&self) -> &Path {
        &self.dst
    }

    fn sink(&mut self) -> Result<&mut Sink, Error> {
        self.sink
            .as_mut()
            .ok_or_else(|| Error::Custom(format!("writer for {:?} is closed", self.dst)))
    }
}

impl<T: Serialize> WriterTrait for JsonlWriter<T> {
    type Item = T;

    fn write(&mut self, vals: Vec<T>) -> Result<(), Error> {
        for val in &vals {
            self.write_single(val)?;
        }
        Ok(())
    }

    fn write_single(&mut self, val: &T) -> Result<(), Error> {
        let mut line = serde_json::to_vec(val)?;
        line.push(b'\n');
        self.sink()?.write_all(&line)?;
        self.nb_records += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<(), Error> {
        if let Some(sink) = self.sink.take() {
            let published = sink
                .close()
                .and_then(|_| std::fs::rename(&self.tmp, &self.dst).map_err(Error::from));
            if let Err(e) = published {
                let _ = std::fs::remove_file(&self.tmp);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl<T> Drop for JsonlWriter<T> {
    fn drop(&mut self) {
        if self.sink.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.tmp) {
                warn!("could not remove unfinished file {:?}: {}", self.tmp, e);
            }
        }
    }
}
