//! Error types for pexcz-core

use crate::archive::Mode;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the pexcz library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An archive could not be opened in the requested mode
    #[error("Failed to open {path:?} ({mode}): {reason}")]
    OpenFailed {
        path: PathBuf,
        mode: Mode,
        reason: String,
    },

    /// Name or size lookup failed for an enumerated entry
    #[error("Failed to read metadata of entry #{index}: {reason}")]
    EntryMetadataUnavailable { index: usize, reason: String },

    /// A source entry could not be opened for reading
    #[error("Failed to open entry #{index} {name:?}: {reason}")]
    EntryOpenFailed {
        index: usize,
        name: String,
        reason: String,
    },

    /// A destination entry could not be added
    #[error("Failed to add entry {name:?}{}: {reason}", source_index(.index))]
    EntryAddFailed {
        index: Option<usize>,
        name: String,
        reason: String,
    },

    /// The codec rejected the requested compression parameters
    #[error("Failed to compress entry {name:?}{}: {reason}", source_index(.index))]
    CompressionSetFailed {
        index: Option<usize>,
        name: String,
        reason: String,
    },

    /// The source prefix does not fit in host memory
    #[error("Archive prefix of {len} bytes exceeds the host limit of {limit} bytes")]
    PrefixTooLarge { len: u64, limit: u64 },

    /// The prefix could not be copied to the destination
    #[error("Failed to write archive prefix: {0}")]
    PrefixWriteFailed(String),

    /// The final commit of a destination archive failed
    #[error("Failed to close {path:?}: {reason}")]
    CloseFailed { path: PathBuf, reason: String },

    /// The archive carries no usable boot manifest
    #[error("Invalid PEX-INFO in {archive:?}: {reason}")]
    ManifestInvalid { archive: PathBuf, reason: String },

    /// No usable interpreter could be resolved for a boot
    #[error("Failed to resolve interpreter {interpreter:?} to boot {archive:?}: {reason}")]
    InterpreterResolutionFailed {
        interpreter: PathBuf,
        archive: PathBuf,
        reason: String,
    },

    /// Replacing the current process with the interpreter failed
    #[error("Failed to boot {archive:?} with {interpreter:?}: {reason}")]
    ExecFailed {
        interpreter: PathBuf,
        archive: PathBuf,
        reason: String,
    },

    /// The application could not be unpacked into the boot cache
    #[error("Failed to unpack {archive:?} for booting: {reason}")]
    UnpackFailed { archive: PathBuf, reason: String },

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),

    /// ZIP-specific error
    #[error("Zip error: {0}")]
    Zip(String),
}

fn source_index(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!(" (source entry #{index})"),
        None => String::new(),
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

impl Error {
    /// Whether this error belongs to the boot path
    pub fn is_boot_failure(&self) -> bool {
        matches!(
            self,
            Error::ManifestInvalid { .. }
                | Error::InterpreterResolutionFailed { .. }
                | Error::UnpackFailed { .. }
                | Error::ExecFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
