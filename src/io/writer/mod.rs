/*!
# Atomic file writing

Every artifact is written next to its destination under a `.tmp` name and renamed into place once
complete. Re-running a stage therefore overwrites its outputs safely, and a killed run never leaves
a truncated file under a final name.
!*/
mod jsonl;
mod writertrait;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Error;
pub use jsonl::{tmp_path, JsonlWriter};
pub use writertrait::WriterTrait;

/// Write a pretty printed JSON file atomically.
pub fn write_json<T: Serialize>(dst: &Path, val: &T) -> Result<(), Error> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(dst);
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut w, val)?;
        w.write_all(b"\n")?;
        w.flush()?;
    }
    std::fs::rename(&tmp, dst)?;
    Ok(())
}
