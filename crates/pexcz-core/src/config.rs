//! Configuration module

use crate::extract::ExtractOptions;
use crate::inject::{Method, PrefixHandling, TargetCompression, TransformPolicy};
use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming an alternate configuration file
pub const CONFIG_ENV: &str = "PEXCZ_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Transform settings
    #[serde(default)]
    pub inject: InjectConfig,
    /// Parallel extraction settings
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Boot settings
    #[serde(default)]
    pub boot: BootConfig,
}

/// Transform configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectConfig {
    /// Compression for re-encoded entries: zstd, deflated, bzip2, stored
    pub compression: Method,
    /// Compression level (codec default when unset)
    pub level: Option<i64>,
    /// Entry names left out of the transformed archive
    pub skip_names: Vec<String>,
    /// Entry name prefixes left out of the transformed archive
    pub skip_prefixes: Vec<String>,
    /// Entry names copied without recompression
    pub retain_compression: Vec<String>,
    /// Whether the source prefix is reproduced
    pub prefix: PrefixHandling,
    /// Directory of native launcher libraries to embed
    pub native_lib_dir: Option<PathBuf>,
}

impl Default for InjectConfig {
    fn default() -> Self {
        let policy = TransformPolicy::default();
        Self {
            compression: policy.target_compression.method,
            level: policy.target_compression.level,
            skip_names: policy.skip_names.into_iter().collect(),
            skip_prefixes: policy.skip_prefixes.into_iter().collect(),
            retain_compression: policy.retain_compression_names.into_iter().collect(),
            prefix: PrefixHandling::Preserve,
            native_lib_dir: None,
        }
    }
}

impl InjectConfig {
    /// Compression applied to re-encoded entries
    pub fn target_compression(&self) -> TargetCompression {
        TargetCompression {
            method: self.compression,
            level: self.level,
        }
    }

    /// The transform policy described by this section
    pub fn policy(&self) -> TransformPolicy {
        TransformPolicy {
            skip_names: self.skip_names.iter().cloned().collect(),
            skip_prefixes: self.skip_prefixes.iter().cloned().collect(),
            retain_compression_names: self.retain_compression.iter().cloned().collect(),
            target_compression: self.target_compression(),
        }
    }
}

/// Parallel extraction configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Number of workers (0 = one per CPU)
    pub workers: usize,
    /// Copy buffer size in bytes; accepts strings like "256KiB"
    #[serde(deserialize_with = "deserialize_size")]
    pub buffer_size: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            buffer_size: ExtractOptions::DEFAULT_BUFFER_SIZE as u64,
        }
    }
}

impl ExtractConfig {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            workers: (self.workers > 0).then_some(self.workers),
            buffer_size: usize::try_from(self.buffer_size)
                .unwrap_or(usize::MAX)
                .max(1),
        }
    }
}

/// Boot configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Interpreter used when none is given on the command line
    pub python: Option<PathBuf>,
    /// Where booted applications are unpacked; `$PEXCZ_CACHE` overrides it
    pub cache_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(bytes) => Ok(bytes),
        SizeValue::Text(text) => parse_size(&text)
            .map_err(|e| D::Error::custom(format!("Failed to parse size: {}", e))),
    }
}

/// Parse size string like "256KiB" to bytes
pub fn parse_size(size_str: &str) -> Result<u64> {
    let size_str = size_str.trim();

    // Try to parse as plain number first
    if let Ok(bytes) = size_str.parse::<u64>() {
        return Ok(bytes);
    }

    // Find where the number ends and unit begins
    let split_pos = size_str
        .chars()
        .position(|c| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());

    if split_pos == 0 {
        return Err(Error::Config(format!("Invalid size format: {}", size_str)));
    }

    let (number_part, unit_part) = size_str.split_at(split_pos);
    let number: f64 = number_part
        .parse()
        .map_err(|_| Error::Config(format!("Invalid number in size: {}", number_part)))?;

    let multiplier: u64 = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "ki" | "kib" => 1_024,
        "mi" | "mib" => 1_048_576,
        "gi" | "gib" => 1_073_741_824,
        _ => return Err(Error::Config(format!("Unknown size unit: {}", unit_part))),
    };

    Ok((number * multiplier as f64) as u64)
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let config_dir = config_dir()
            .ok_or_else(|| Error::Config("Unable to determine config directory".to_string()))?;
        Ok(config_dir.join("pexcz").join("config.toml"))
    }

    /// Get default configuration content with comments
    pub fn default_config_content() -> String {
        r#"# pexcz configuration file

[inject]
# Compression for re-encoded entries: zstd, deflated, bzip2, stored
compression = "zstd"
# Compression level (zstd: -7..=22, deflated: 0..=9, bzip2: 1..=9)
level = 3
# Entries dropped from the transformed archive and regenerated by pexcz
skip_names = ["__main__.py"]
skip_prefixes = [".bootstrap/", "__pex__/"]
# Entries copied without recompression
retain_compression = ["PEX-INFO"]
# Reproduce the source shebang prefix: preserve or strip
prefix = "preserve"
# Directory of native launcher libraries to embed under __pexcz__/pexcz/.lib/,
# laid out as <arch>-<os>[-<abi>]/<library>. When unset, the launcher library
# built next to the pexcz executable is embedded for this platform.
# native_lib_dir = "/path/to/lib"

[extract]
# Number of extraction workers (0 = one per CPU)
workers = 0
# Copy buffer size per worker
buffer_size = "256KiB"

[boot]
# Interpreter used when `pexcz boot` is not given --python
# python = "/usr/bin/python3"
# Where booted applications are unpacked (default: pexcz/ in the user cache)
# cache_dir = "/var/cache/pexcz"
"#
        .to_string()
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults; nothing is written.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        config.inject.target_compression().validate()?;
        Ok(config)
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!("Ignoring configuration: {}", e);
            Self::default()
        })
    }
}
