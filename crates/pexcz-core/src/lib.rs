//! pexcz - fast-booting PEX archives
//!
//! This library rewrites PEX zip archives into `.czex` archives whose
//! entry points hand off to a native launcher, extracts archives in
//! parallel, and boots an archive by replacing the current process with
//! a Python interpreter.

pub mod archive;
pub mod boot;
pub mod config;
pub mod error;
pub mod extract;
pub mod ffi;
pub mod inject;
pub mod progress;
pub mod security;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{DestinationArchive, Entry, Mode, SourceArchive};
pub use boot::{BootRequest, BootSequencer, BootTarget, HostEnv, BOOT_ERROR_CODE};
pub use extract::{extract_all, parallel_extract, ExtractOptions, ExtractSummary};
pub use inject::{czex_path, inject, transform, PrefixHandling, TransformPolicy, TransformReport};
pub use config::Config;
pub use progress::{NoProgress, ProgressSink};
