//! Synthetic PEX archives

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Shebang line used by zipapp-style PEX files
pub const SHEBANG: &[u8] = b"#!/usr/bin/env python3\n";

#[derive(Debug, Clone)]
enum FixtureEntry {
    File {
        name: String,
        data: Vec<u8>,
        compression: Option<CompressionMethod>,
        mode: u32,
    },
    Dir {
        name: String,
    },
}

/// Builds a zip archive entry by entry, in insertion order
#[derive(Debug, Clone)]
pub struct PexBuilder {
    prefix: Vec<u8>,
    entries: Vec<FixtureEntry>,
    compression: CompressionMethod,
    timestamp: DateTime,
}

impl Default for PexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PexBuilder {
    /// Deflated entries stamped 2024-05-01 12:30:00
    pub fn new() -> Self {
        Self {
            prefix: Vec::new(),
            entries: Vec::new(),
            compression: CompressionMethod::Deflated,
            timestamp: DateTime::from_date_and_time(2024, 5, 1, 12, 30, 0)
                .unwrap_or_default(),
        }
    }

    /// Bytes written before the first entry
    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    /// Compression used by entries without an explicit method
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Modification time of every entry
    pub fn timestamp(mut self, timestamp: DateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn file(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(FixtureEntry::File {
            name: name.to_string(),
            data: data.to_vec(),
            compression: None,
            mode: 0o644,
        });
        self
    }

    /// A file stored with a specific compression method
    pub fn file_with(mut self, name: &str, data: &[u8], method: CompressionMethod) -> Self {
        self.entries.push(FixtureEntry::File {
            name: name.to_string(),
            data: data.to_vec(),
            compression: Some(method),
            mode: 0o644,
        });
        self
    }

    /// A file with the executable bits set
    pub fn executable(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push(FixtureEntry::File {
            name: name.to_string(),
            data: data.to_vec(),
            compression: None,
            mode: 0o755,
        });
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(FixtureEntry::Dir {
            name: name.to_string(),
        });
        self
    }

    /// Write the archive to `path`, returning the path
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file =
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        file.write_all(&self.prefix)?;

        let mut writer = ZipWriter::new(file);
        for entry in &self.entries {
            match entry {
                FixtureEntry::File {
                    name,
                    data,
                    compression,
                    mode,
                } => {
                    let options = SimpleFileOptions::default()
                        .compression_method(compression.unwrap_or(self.compression))
                        .last_modified_time(self.timestamp)
                        .unix_permissions(*mode);
                    writer.start_file(name.as_str(), options)?;
                    writer.write_all(data)?;
                }
                FixtureEntry::Dir { name } => {
                    let options = SimpleFileOptions::default()
                        .compression_method(CompressionMethod::Stored)
                        .last_modified_time(self.timestamp)
                        .unix_permissions(0o755);
                    writer.add_directory(name.as_str(), options)?;
                }
            }
        }
        writer.finish()?;
        Ok(path.to_path_buf())
    }
}

/// A `PEX-INFO` document running `entry_point`
pub fn pex_info(entry_point: &str) -> Vec<u8> {
    format!(
        r#"{{"entry_point": "{}", "pex_hash": "0123456789abcdef", "inject_args": [], "inject_python_args": [], "inject_env": {{}}}}"#,
        entry_point
    )
    .into_bytes()
}

/// A small application laid out like a PEX built by the pex tool
pub fn sample_pex() -> PexBuilder {
    PexBuilder::new()
        .prefix(SHEBANG)
        .file(".bootstrap/pex/__init__.py", b"")
        .file(".bootstrap/pex/pex.py", b"class PEX(object):\n    pass\n")
        .file("__main__.py", b"import sys\nsys.exit(0)\n")
        .file("__pex__/__init__.py", b"")
        .file("PEX-INFO", &pex_info("app.main:run"))
        .dir("app/")
        .file("app/__init__.py", b"")
        .file("app/main.py", b"def run():\n    print('hello')\n")
        .executable("app/bin/tool", b"#!/bin/sh\necho tool\n")
        .file("app/data/large.txt", "pexcz ".repeat(16 * 1024).as_bytes())
}
