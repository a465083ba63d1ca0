//! Testing utilities and fixtures for pexcz
//!
//! This crate builds synthetic PEX archives and inspects the archives and
//! directories pexcz produces. It deliberately depends on the zip codec
//! directly rather than on pexcz-core, so assertions never go through the
//! code under test.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub mod assertions;
pub mod fixtures;
pub mod helpers;

use fixtures::PexBuilder;

/// Leading bytes of an ELF file
pub const ELF_MAGIC: &[u8] = b"\x7fELF";

/// Scratch directory for one test, removed on drop
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `name`, creating parent directories
    pub fn create_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write the archive built by `pex` to `name`
    pub fn write_pex(&self, name: &str, pex: &PexBuilder) -> Result<PathBuf> {
        pex.write_to(self.dir.path().join(name))
    }

    /// A directory laid out like a `native_lib_dir`, holding a stand-in
    /// ELF file at each relative path in `libraries`
    pub fn native_lib_dir(&self, libraries: &[&str]) -> Result<PathBuf> {
        let dir = self.dir.path().join("native-libs");
        std::fs::create_dir_all(&dir)?;
        for library in libraries {
            self.create_file(&format!("native-libs/{library}"), ELF_MAGIC)?;
        }
        Ok(dir)
    }
}
