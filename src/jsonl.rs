//! JSON Lines output writer.
//!
//! One UTF-8 JSON object per line, non-Latin characters kept verbatim,
//! flushed after every record so interrupted runs leave valid output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Line-delimited JSON writer over any sink.
#[derive(Debug)]
pub struct JsonlWriter<W: Write> {
    inner: W,
    written: usize,
}

impl JsonlWriter<BufWriter<File>> {
    /// Create a writer for a file path, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlWriter<W> {
    /// Wrap an arbitrary sink.
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Serialize one record as a JSON line and flush.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Consume the writer, returning the sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
