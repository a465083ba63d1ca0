//! Read-only archive handle and entry enumerator

use super::{checked_prefix_len_within, Entry, Mode, MAX_PREFIX_LEN};
use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::read::ZipFile;
use zip::ZipArchive;

/// Exclusive read-only handle on one open archive
pub struct SourceArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl SourceArchive {
    /// Open an existing archive for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open_failed = |reason: String| Error::OpenFailed {
            path: path.to_path_buf(),
            mode: Mode::ReadOnly,
            reason,
        };

        let file = File::open(path).map_err(|e| open_failed(e.to_string()))?;
        let archive = ZipArchive::new(file).map_err(|e| open_failed(e.to_string()))?;
        debug!(path = ?path, entries = archive.len(), "Opened archive");

        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    /// Path this handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries, known without reading any of them
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Describe the entry at `index` without decompressing it
    pub fn entry(&mut self, index: usize) -> Result<Entry> {
        let file = self
            .archive
            .by_index_raw(index)
            .map_err(|e| Error::EntryMetadataUnavailable {
                index,
                reason: e.to_string(),
            })?;
        Ok(Entry::from_zip_file(index, &file))
    }

    /// Enumerate every entry in central directory order.
    ///
    /// The sequence can be restarted by calling this again; nothing is
    /// cached between calls.
    pub fn entries(&mut self) -> impl Iterator<Item = Result<Entry>> + '_ {
        let len = self.len();
        (0..len).map(move |index| self.entry(index))
    }

    /// Open an entry for streamed, decompressed reading
    pub fn reader(&mut self, entry: &Entry) -> Result<ZipFile<'_>> {
        self.archive
            .by_index(entry.index)
            .map_err(|e| Error::EntryOpenFailed {
                index: entry.index,
                name: entry.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Open an entry for copying its compressed bytes as-is
    pub fn raw_reader(&mut self, entry: &Entry) -> Result<ZipFile<'_>> {
        self.archive
            .by_index_raw(entry.index)
            .map_err(|e| Error::EntryOpenFailed {
                index: entry.index,
                name: entry.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Read a whole entry by name, if present
    pub fn read_by_name(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let index = match self.archive.index_for_name(name) {
            Some(index) => index,
            None => return Ok(None),
        };
        let entry = self.entry(index)?;
        let mut reader = self.reader(&entry)?;
        let mut data = Vec::with_capacity(entry.size as usize);
        reader.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Length of the opaque bytes stored before the first entry
    pub fn prefix_len(&mut self) -> Result<u64> {
        let mut first_header: Option<u64> = None;
        for entry in self.entries() {
            let start = entry?.header_start;
            first_header = Some(first_header.map_or(start, |current| current.min(start)));
        }
        Ok(first_header.unwrap_or_else(|| self.archive.offset()))
    }

    /// Read the prefix bytes exactly as they appear in the source file
    pub fn read_prefix(&mut self) -> Result<Vec<u8>> {
        self.read_prefix_within(MAX_PREFIX_LEN)
    }

    pub(crate) fn read_prefix_within(&mut self, limit: u64) -> Result<Vec<u8>> {
        let len = checked_prefix_len_within(self.prefix_len()?, limit)?;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(0))?;
        let mut prefix = vec![0u8; len];
        file.read_exact(&mut prefix)?;
        Ok(prefix)
    }

    /// Release the handle
    pub fn close(self) -> Result<()> {
        debug!(path = ?self.path, "Closed archive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexcz_testing::fixtures::PexBuilder;
    use pexcz_testing::TestDir;

    #[test]
    fn test_open_missing_archive() {
        let test_dir = TestDir::new().unwrap();
        let missing = test_dir.path().join("missing.pex");
        match SourceArchive::open(&missing) {
            Err(Error::OpenFailed { path, mode, .. }) => {
                assert_eq!(path, missing);
                assert_eq!(mode, Mode::ReadOnly);
            }
            other => panic!("expected OpenFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_non_zip() {
        let test_dir = TestDir::new().unwrap();
        let path = test_dir.create_file("garbage.pex", b"not a zip").unwrap();
        assert!(matches!(
            SourceArchive::open(&path),
            Err(Error::OpenFailed { .. })
        ));
    }

    #[test]
    fn test_entries_are_restartable() {
        let test_dir = TestDir::new().unwrap();
        let pex = PexBuilder::new()
            .file("PEX-INFO", b"{}")
            .dir("a/")
            .file("a/b.py", b"print('b')")
            .write_to(test_dir.path().join("app.pex"))
            .unwrap();

        let mut source = SourceArchive::open(&pex).unwrap();
        assert_eq!(source.len(), 3);

        let first: Vec<String> = source.entries().map(|e| e.unwrap().name).collect();
        let second: Vec<String> = source.entries().map(|e| e.unwrap().name).collect();
        assert_eq!(first, vec!["PEX-INFO", "a/", "a/b.py"]);
        assert_eq!(first, second);

        let dir = source.entry(1).unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.index, 1);
    }

    #[test]
    fn test_entry_out_of_range() {
        let test_dir = TestDir::new().unwrap();
        let pex = PexBuilder::new()
            .file("PEX-INFO", b"{}")
            .write_to(test_dir.path().join("app.pex"))
            .unwrap();

        let mut source = SourceArchive::open(&pex).unwrap();
        assert!(matches!(
            source.entry(5),
            Err(Error::EntryMetadataUnavailable { index: 5, .. })
        ));
    }

    #[test]
    fn test_prefix_roundtrip() {
        let test_dir = TestDir::new().unwrap();
        let shebang = b"#!/usr/bin/env python3\n";
        let pex = PexBuilder::new()
            .prefix(shebang)
            .file("PEX-INFO", b"{}")
            .write_to(test_dir.path().join("app.pex"))
            .unwrap();

        let mut source = SourceArchive::open(&pex).unwrap();
        assert_eq!(source.prefix_len().unwrap(), shebang.len() as u64);
        assert_eq!(source.read_prefix().unwrap(), shebang.to_vec());
    }

    #[test]
    fn test_no_prefix() {
        let test_dir = TestDir::new().unwrap();
        let pex = PexBuilder::new()
            .file("PEX-INFO", b"{}")
            .write_to(test_dir.path().join("app.pex"))
            .unwrap();

        let mut source = SourceArchive::open(&pex).unwrap();
        assert_eq!(source.prefix_len().unwrap(), 0);
        assert!(source.read_prefix().unwrap().is_empty());
    }

    #[test]
    fn test_read_by_name() {
        let test_dir = TestDir::new().unwrap();
        let pex = PexBuilder::new()
            .file("PEX-INFO", br#"{"entry_point": "app"}"#)
            .write_to(test_dir.path().join("app.pex"))
            .unwrap();

        let mut source = SourceArchive::open(&pex).unwrap();
        assert_eq!(
            source.read_by_name("PEX-INFO").unwrap().unwrap(),
            br#"{"entry_point": "app"}"#.to_vec()
        );
        assert!(source.read_by_name("missing").unwrap().is_none());
    }
}
