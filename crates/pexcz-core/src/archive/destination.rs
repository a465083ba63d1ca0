//! Write handle for archives under construction
//!
//! Entries are streamed into a temporary file next to the destination.
//! The destination path is only touched by [`DestinationArchive::close`],
//! which finishes the central directory, syncs the file and renames it
//! into place. Dropping a handle without closing it discards the
//! temporary file, so a failed transform never leaves a half-written
//! archive at the destination.

use super::{min_timestamp, Mode};
use crate::{Error, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

enum WriterState {
    /// No entry written yet; a prefix may still be set
    Pending(File),
    Writing(ZipWriter<File>),
    Failed,
}

/// Exclusive write handle on an archive being built
pub struct DestinationArchive {
    // Declared first so the writer is dropped before its temporary file.
    state: WriterState,
    temp_path: TempPath,
    path: PathBuf,
    mode: Mode,
    prefix_len: u64,
    entries: usize,
}

impl DestinationArchive {
    /// Start building an archive at `path`.
    ///
    /// `Mode::Create` refuses to replace an existing file, `Mode::CreateTruncate`
    /// replaces it when the handle is closed.
    pub fn create<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let path = path.as_ref();
        let open_failed = |reason: String| Error::OpenFailed {
            path: path.to_path_buf(),
            mode,
            reason,
        };

        match mode {
            Mode::ReadOnly => {
                return Err(open_failed(
                    "a destination archive cannot be opened read-only".to_string(),
                ))
            }
            Mode::Create if path.exists() => {
                return Err(open_failed("destination already exists".to_string()))
            }
            _ => {}
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(".pexcz-").suffix(".tmp");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o644));
        }
        let temp = builder
            .tempfile_in(parent)
            .map_err(|e| open_failed(e.to_string()))?;
        let (file, temp_path) = temp.into_parts();
        debug!(path = ?path, temp = ?temp_path, %mode, "Created destination archive");

        Ok(Self {
            state: WriterState::Pending(file),
            temp_path,
            path: path.to_path_buf(),
            mode,
            prefix_len: 0,
            entries: 0,
        })
    }

    /// Final path of the archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries added so far
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Length of the prefix written before the archive
    pub fn prefix_len(&self) -> u64 {
        self.prefix_len
    }

    /// Write opaque bytes ahead of the archive. Must precede every entry.
    pub fn set_prefix(&mut self, prefix: &[u8]) -> Result<()> {
        let file = match &mut self.state {
            WriterState::Pending(file) => file,
            _ => {
                return Err(Error::PrefixWriteFailed(
                    "the prefix must be written before any entry".to_string(),
                ))
            }
        };
        file.write_all(prefix)
            .map_err(|e| Error::PrefixWriteFailed(e.to_string()))?;
        self.prefix_len += prefix.len() as u64;
        Ok(())
    }

    fn writer(&mut self) -> Option<&mut ZipWriter<File>> {
        if let WriterState::Pending(_) = self.state {
            if let WriterState::Pending(file) = mem::replace(&mut self.state, WriterState::Failed) {
                self.state = WriterState::Writing(ZipWriter::new(file));
            }
        }
        match &mut self.state {
            WriterState::Writing(writer) => Some(writer),
            _ => None,
        }
    }

    /// Copy a source entry's compressed bytes unchanged, stamping it with
    /// the minimum timestamp. The entry keeps its name and compression.
    pub fn copy_raw(&mut self, index: usize, file: ZipFile<'_>) -> Result<()> {
        let name = file.name().to_string();
        let unix_mode = file.unix_mode();

        self.writer()
            .ok_or_else(|| unusable(&name, Some(index)))?
            .raw_copy_file_touch(file, min_timestamp(), unix_mode)
            .map_err(|e| Error::EntryAddFailed {
                index: Some(index),
                name: name.clone(),
                reason: e.to_string(),
            })?;
        self.entries += 1;
        debug!(index, name = %name, "Copied entry without recompression");
        Ok(())
    }

    /// Add an entry whose content is streamed from `reader` and encoded
    /// according to `options`.
    pub fn add_stream(
        &mut self,
        index: Option<usize>,
        name: &str,
        reader: &mut dyn Read,
        options: SimpleFileOptions,
    ) -> Result<()> {
        let writer = self.writer().ok_or_else(|| unusable(name, index))?;

        if let Err(e) = writer.start_file(name, options) {
            self.state = WriterState::Failed;
            return Err(match e {
                ZipError::UnsupportedArchive(reason) => Error::CompressionSetFailed {
                    index,
                    name: name.to_string(),
                    reason: reason.to_string(),
                },
                other => Error::EntryAddFailed {
                    index,
                    name: name.to_string(),
                    reason: other.to_string(),
                },
            });
        }

        if let Err(e) = io::copy(reader, writer) {
            // Nothing after a torn entry can be trusted.
            self.state = WriterState::Failed;
            return Err(Error::EntryAddFailed {
                index,
                name: name.to_string(),
                reason: e.to_string(),
            });
        }

        self.entries += 1;
        Ok(())
    }

    /// Add an entry from an in-memory buffer
    pub fn add_bytes(&mut self, name: &str, data: &[u8], options: SimpleFileOptions) -> Result<()> {
        let mut reader = data;
        self.add_stream(None, name, &mut reader, options)
    }

    /// Add a directory entry
    pub fn add_directory(&mut self, name: &str, options: SimpleFileOptions) -> Result<()> {
        self.writer()
            .ok_or_else(|| unusable(name, None))?
            .add_directory(name, options)
            .map_err(|e| Error::EntryAddFailed {
                index: None,
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        self.entries += 1;
        Ok(())
    }

    /// Commit every queued change to the destination path.
    ///
    /// Until this returns `Ok`, the destination must be treated as
    /// provisional.
    pub fn close(mut self) -> Result<PathBuf> {
        let close_failed = |path: &Path, reason: String| Error::CloseFailed {
            path: path.to_path_buf(),
            reason,
        };

        let file = match mem::replace(&mut self.state, WriterState::Failed) {
            WriterState::Writing(writer) => writer.finish(),
            WriterState::Pending(file) => ZipWriter::new(file).finish(),
            WriterState::Failed => {
                return Err(close_failed(
                    &self.path,
                    "the archive is incomplete after a failed write".to_string(),
                ))
            }
        }
        .map_err(|e| close_failed(&self.path, e.to_string()))?;
        file.sync_all()
            .map_err(|e| close_failed(&self.path, e.to_string()))?;
        drop(file);

        let Self {
            path,
            mode,
            temp_path,
            ..
        } = self;
        let persisted = match mode {
            Mode::Create => temp_path.persist_noclobber(&path),
            _ => temp_path.persist(&path),
        };
        persisted.map_err(|e| close_failed(&path, e.error.to_string()))?;

        debug!(path = ?path, "Committed destination archive");
        Ok(path)
    }
}

fn unusable(name: &str, index: Option<usize>) -> Error {
    Error::EntryAddFailed {
        index,
        name: name.to_string(),
        reason: "a previous write to this archive failed".to_string(),
    }
}
