//! PEX to `.czex` transform engine
//!
//! A transform copies the source prefix, then walks the source entries in
//! central directory order and asks the [`TransformPolicy`] what to do with
//! each one. Surviving entries keep their relative order. The runtime
//! [`Resource`]s follow in a fixed order. Every entry the engine writes
//! carries the minimum zip timestamp, so transforming the same input twice
//! under the same policy produces the same bytes.
//!
//! The engine stops at the first error. The destination stays
//! provisional until it has been closed, so a failed transform leaves
//! nothing behind at the destination path.

pub mod policy;
pub mod resources;

pub use policy::{Decision, Method, TargetCompression, TransformPolicy, PEX_INFO};
pub use resources::{default_resources, launcher_libraries, Resource};

use crate::archive::{DestinationArchive, Mode, SourceArchive, MAX_PREFIX_LEN};
use crate::config::Config;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of transformed archives
pub const CZEX_EXTENSION: &str = "czex";

/// What to do with the source prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixHandling {
    /// Reproduce the source prefix byte for byte
    #[default]
    Preserve,
    /// Write the destination without a prefix
    Strip,
}

/// Outcome of one transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    /// Committed destination path
    pub path: PathBuf,
    /// Prefix bytes written ahead of the entries
    pub prefix_len: u64,
    /// Source entries left out
    pub skipped: usize,
    /// Source entries copied with their original compression
    pub copied: usize,
    /// Source entries re-encoded with the target compression
    pub recompressed: usize,
    /// Resources added after the source entries
    pub injected: usize,
}

impl TransformReport {
    /// Total number of entries in the destination
    pub fn entries(&self) -> usize {
        self.copied + self.recompressed + self.injected
    }
}

/// Path of the `.czex` archive produced for `source`
pub fn czex_path<P: AsRef<Path>>(source: P) -> Result<PathBuf> {
    let source = source.as_ref();
    if source.file_name().is_none() {
        return Err(Error::InvalidPath(format!(
            "{:?} does not name an archive file",
            source
        )));
    }
    if source.extension().is_some_and(|ext| ext == CZEX_EXTENSION) {
        return Err(Error::InvalidPath(format!(
            "{:?} is already a .{} archive",
            source, CZEX_EXTENSION
        )));
    }
    Ok(source.with_extension(CZEX_EXTENSION))
}

/// Transform the PEX at `pex` into a `.czex` beside it, using the policy,
/// prefix handling and resources from `config`.
pub fn inject<P: AsRef<Path>>(
    pex: P,
    config: &Config,
    sink: &mut dyn ProgressSink,
) -> Result<TransformReport> {
    let pex = pex.as_ref();
    let dest = czex_path(pex)?;
    let policy = config.inject.policy();
    let resources =
        default_resources(launcher_libraries(config.inject.native_lib_dir.as_deref())?);

    info!("Injecting {:?} into {:?}", pex, dest);
    let mut source = SourceArchive::open(pex)?;
    let report = transform(
        &mut source,
        &dest,
        Mode::CreateTruncate,
        &policy,
        config.inject.prefix,
        &resources,
        sink,
    )?;
    source.close()?;
    Ok(report)
}

/// Rewrite `source` into a new archive at `dest_path`.
///
/// `resources` are appended after the transferred entries in the given
/// order, each with its own compression.
pub fn transform(
    source: &mut SourceArchive,
    dest_path: &Path,
    mode: Mode,
    policy: &TransformPolicy,
    prefix_handling: PrefixHandling,
    resources: &[Resource],
    sink: &mut dyn ProgressSink,
) -> Result<TransformReport> {
    transform_within(
        source,
        dest_path,
        mode,
        policy,
        prefix_handling,
        resources,
        sink,
        MAX_PREFIX_LEN,
    )
}

#[allow(clippy::too_many_arguments)]
fn transform_within(
    source: &mut SourceArchive,
    dest_path: &Path,
    mode: Mode,
    policy: &TransformPolicy,
    prefix_handling: PrefixHandling,
    resources: &[Resource],
    sink: &mut dyn ProgressSink,
    prefix_limit: u64,
) -> Result<TransformReport> {
    policy.validate()?;

    // The prefix is checked before the destination exists.
    let prefix = match prefix_handling {
        PrefixHandling::Preserve => source.read_prefix_within(prefix_limit)?,
        PrefixHandling::Strip => Vec::new(),
    };

    let mut dest = DestinationArchive::create(dest_path, mode)?;
    if !prefix.is_empty() {
        dest.set_prefix(&prefix)?;
        debug!(len = prefix.len(), "Preserved archive prefix");
    }

    let total = (source.len() + resources.len()) as u64;
    let mut tracker = ProgressTracker::new(total);
    sink.start(total);

    let mut done = 0u64;
    let mut report = TransformReport {
        path: dest_path.to_path_buf(),
        prefix_len: dest.prefix_len(),
        skipped: 0,
        copied: 0,
        recompressed: 0,
        injected: 0,
    };

    for index in 0..source.len() {
        let entry = source.entry(index)?;
        match policy.decide(&entry) {
            Decision::Skip => {
                debug!(index, name = %entry.name, "Skipping entry");
                report.skipped += 1;
            }
            Decision::CopyVerbatim => {
                let file = source.raw_reader(&entry)?;
                dest.copy_raw(index, file)?;
                report.copied += 1;
            }
            Decision::Recompress(target) => {
                let mut options = target
                    .file_options()
                    .large_file(entry.size >= u32::MAX as u64);
                if let Some(mode) = entry.unix_mode {
                    options = options.unix_permissions(mode);
                }
                let mut reader = source.reader(&entry)?;
                dest.add_stream(Some(index), &entry.name, &mut reader, options)?;
                debug!(index, name = %entry.name, method = %target.method, "Recompressed entry");
                report.recompressed += 1;
            }
        }
        done += 1;
        tracker.report(fraction(done, total), sink);
    }

    for resource in resources {
        let options = resource.compression.file_options().unix_permissions(0o644);
        dest.add_bytes(&resource.name, &resource.data, options)?;
        debug!(name = %resource.name, size = resource.data.len(), "Injected resource");
        report.injected += 1;
        done += 1;
        tracker.report(fraction(done, total), sink);
    }

    let path = dest.close()?;
    tracker.report(1.0, sink);
    sink.finish();

    if let Err(e) = mark_executable(&path) {
        warn!("Failed to mark {:?} executable: {}", path, e);
    }

    info!(
        "Wrote {:?}: {} copied, {} recompressed, {} injected, {} skipped",
        path, report.copied, report.recompressed, report.injected, report.skipped
    );
    report.path = path;
    Ok(report)
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
