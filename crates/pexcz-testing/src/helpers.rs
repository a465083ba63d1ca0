//! Archive inspection helpers

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::{CompressionMethod, DateTime, ZipArchive};

/// `(year, month, day, hour, minute, second)`
pub type Timestamp = (u16, u8, u8, u8, u8, u8);

/// The earliest zip timestamp
pub const MIN_TIMESTAMP: Timestamp = (1980, 1, 1, 0, 0, 0);

fn timestamp(ts: DateTime) -> Timestamp {
    (ts.year(), ts.month(), ts.day(), ts.hour(), ts.minute(), ts.second())
}

/// Everything a test may want to assert about one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub name: String,
    pub is_dir: bool,
    pub compression: CompressionMethod,
    pub modified: Option<Timestamp>,
    pub unix_mode: Option<u32>,
    pub data: Vec<u8>,
}

impl EntrySnapshot {
    /// Whether the entry carries 1980-01-01 00:00:00
    pub fn has_min_timestamp(&self) -> bool {
        self.modified == Some(MIN_TIMESTAMP)
    }
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    ZipArchive::new(file).with_context(|| format!("Failed to read archive {:?}", path))
}

/// Read every entry of the archive at `path`, decompressing contents
pub fn snapshot(path: &Path) -> Result<Vec<EntrySnapshot>> {
    let mut archive = open(path)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut data)?;
        }
        entries.push(EntrySnapshot {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            compression: file.compression(),
            modified: file.last_modified().map(timestamp),
            unix_mode: file.unix_mode(),
            data,
        });
    }
    Ok(entries)
}

/// Entry names in central directory order
pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let mut archive = open(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index_raw(index)?.name().to_string());
    }
    Ok(names)
}

/// Offset of the first local header, which is also the prefix length
pub fn archive_data_offset(path: &Path) -> Result<u64> {
    let mut archive = open(path)?;
    let mut offset = archive.offset();
    for index in 0..archive.len() {
        let start = archive.by_index_raw(index)?.header_start();
        offset = if index == 0 { start } else { offset.min(start) };
    }
    Ok(offset)
}

/// Reference single-threaded extraction of every file entry
pub fn sequential_extract(archive: &Path, dest: &Path) -> Result<()> {
    let mut archive = open(archive)?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let target = dest.join(file.name());
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut file, &mut out)?;
    }
    Ok(())
}
