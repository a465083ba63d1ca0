//! Entry transfer policy
//!
//! The policy is a pure decision over entry names. It never looks at
//! entry content, so the same policy applied to the same archive always
//! yields the same destination layout.

use crate::archive::{min_timestamp, Entry};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Name of the PEX metadata entry
pub const PEX_INFO: &str = "PEX-INFO";

/// Compression method for re-encoded entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Store entries without compression
    Stored,
    /// Deflate compression
    Deflated,
    /// Bzip2 compression
    Bzip2,
    /// Zstandard compression
    Zstd,
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "store" | "none" => Ok(Method::Stored),
            "deflated" | "deflate" => Ok(Method::Deflated),
            "bzip2" | "bz2" => Ok(Method::Bzip2),
            "zstd" | "zst" => Ok(Method::Zstd),
            _ => Err(Error::Config(format!("Unknown compression method: {}", s))),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Stored => write!(f, "stored"),
            Method::Deflated => write!(f, "deflated"),
            Method::Bzip2 => write!(f, "bzip2"),
            Method::Zstd => write!(f, "zstd"),
        }
    }
}

impl Method {
    /// The codec's identifier for this method
    pub fn to_zip(self) -> CompressionMethod {
        match self {
            Method::Stored => CompressionMethod::Stored,
            Method::Deflated => CompressionMethod::Deflated,
            Method::Bzip2 => CompressionMethod::Bzip2,
            Method::Zstd => CompressionMethod::Zstd,
        }
    }

    fn level_range(self) -> Option<(i64, i64)> {
        match self {
            Method::Stored => None,
            Method::Deflated => Some((0, 9)),
            Method::Bzip2 => Some((1, 9)),
            Method::Zstd => Some((-7, 22)),
        }
    }
}

/// Compression applied to entries that are re-encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCompression {
    pub method: Method,
    /// Codec level; `None` uses the codec default
    pub level: Option<i64>,
}

impl Default for TargetCompression {
    fn default() -> Self {
        Self {
            method: Method::Zstd,
            level: Some(3),
        }
    }
}

impl TargetCompression {
    /// Reject levels the codec would refuse
    pub fn validate(&self) -> Result<()> {
        match (self.method.level_range(), self.level) {
            (_, None) => Ok(()),
            (None, Some(level)) => Err(Error::Config(format!(
                "Compression method {} takes no level, got {}",
                self.method, level
            ))),
            (Some((min, max)), Some(level)) if level < min || level > max => {
                Err(Error::Config(format!(
                    "Compression level {} is out of range {}..={} for {}",
                    level, min, max, self.method
                )))
            }
            _ => Ok(()),
        }
    }

    /// Writer options for an entry encoded with this compression
    pub fn file_options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(self.method.to_zip())
            .compression_level(self.level)
            .last_modified_time(min_timestamp())
    }
}

/// What happens to one source entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the entry out of the destination
    Skip,
    /// Copy the compressed bytes unchanged
    CopyVerbatim,
    /// Decompress and re-encode with the target compression
    Recompress(TargetCompression),
}

/// Selects, per entry name, how the transform treats it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformPolicy {
    /// Names dropped from the destination
    pub skip_names: BTreeSet<String>,
    /// Name prefixes dropped from the destination
    pub skip_prefixes: BTreeSet<String>,
    /// Names copied with their original compression
    pub retain_compression_names: BTreeSet<String>,
    /// Compression for everything else
    pub target_compression: TargetCompression,
}

impl Default for TransformPolicy {
    fn default() -> Self {
        Self {
            skip_names: ["__main__.py"].iter().map(|s| s.to_string()).collect(),
            skip_prefixes: [".bootstrap/", "__pex__/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            retain_compression_names: [PEX_INFO].iter().map(|s| s.to_string()).collect(),
            target_compression: TargetCompression::default(),
        }
    }
}

impl TransformPolicy {
    /// Policy with the default name rules and the given target compression
    pub fn with_compression(target_compression: TargetCompression) -> Self {
        Self {
            target_compression,
            ..Default::default()
        }
    }

    /// Whether an entry name is excluded from the destination
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip_names.contains(name)
            || self
                .skip_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Decide how to transfer `entry`
    pub fn decide(&self, entry: &Entry) -> Decision {
        if self.is_skipped(&entry.name) {
            Decision::Skip
        } else if entry.is_dir || self.retain_compression_names.contains(&entry.name) {
            Decision::CopyVerbatim
        } else {
            Decision::Recompress(self.target_compression)
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.target_compression.validate()
    }
}
