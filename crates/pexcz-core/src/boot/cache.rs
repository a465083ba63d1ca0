//! Unpacked application cache
//!
//! Entries re-encoded by a transform may use a method `zipimport` cannot
//! read, so a boot unpacks the application once per archive build into
//! `<cache>/apps/<key>` and points the interpreter at that directory.
//! Unpacking goes to a staging directory that is renamed into place, so a
//! key directory is always complete.

use super::env::EnvSource;
use super::BootTarget;
use crate::archive::Entry;
use crate::extract::{parallel_extract, ExtractOptions};
use crate::inject::resources::RUNTIME_ROOT;
use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// Variable naming the cache root
pub const CACHE_ENV: &str = "PEXCZ_CACHE";

/// Variable through which the interpreter finds the unpacked application
pub const APP_ROOT_ENV: &str = "PEXCZ_APP_ROOT";

/// Cache root: `$PEXCZ_CACHE`, then `configured`, then `pexcz/` under the
/// platform cache directory.
pub fn cache_dir(env: &dyn EnvSource, configured: Option<&Path>) -> Option<PathBuf> {
    env.get(CACHE_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| configured.map(Path::to_path_buf))
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("pexcz")))
}

/// Directory name identifying one build of `archive`.
///
/// The `PEX-INFO` code hash (or pex hash) when present, otherwise a hash
/// of the archive's path, size and modification time.
pub fn cache_key(archive: &Path, target: &BootTarget) -> Result<String> {
    let recorded = target
        .code_hash
        .as_deref()
        .or(target.pex_hash.as_deref())
        .filter(|hash| {
            !hash.is_empty()
                && hash
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    if let Some(hash) = recorded {
        return Ok(hash.to_string());
    }

    let metadata = fs::metadata(archive)?;
    let mut hasher = DefaultHasher::new();
    archive.hash(&mut hasher);
    metadata.len().hash(&mut hasher);
    if let Ok(modified) = metadata.modified() {
        if let Ok(since) = modified.duration_since(UNIX_EPOCH) {
            since.as_nanos().hash(&mut hasher);
        }
    }
    Ok(format!("{:016x}", hasher.finish()))
}

/// Entries the interpreter needs on disk; the bootstrap stays in the archive
pub fn is_application_entry(entry: &Entry) -> bool {
    entry.name != "__main__.py"
        && !entry.name.starts_with(RUNTIME_ROOT)
        && !entry.name.starts_with("__pex__/")
}

/// Unpack `archive` below `cache_root` unless an earlier boot already did,
/// returning the application directory.
pub fn unpack(archive: &Path, target: &BootTarget, cache_root: &Path) -> Result<PathBuf> {
    let failed = |reason: String| Error::UnpackFailed {
        archive: archive.to_path_buf(),
        reason,
    };

    let apps = cache_root.join("apps");
    let app_root = apps.join(cache_key(archive, target).map_err(|e| failed(e.to_string()))?);
    if app_root.is_dir() {
        debug!(app_root = ?app_root, "Reusing unpacked application");
        return Ok(app_root);
    }

    fs::create_dir_all(&apps).map_err(|e| failed(e.to_string()))?;
    let staging = tempfile::Builder::new()
        .prefix(".unpack-")
        .tempdir_in(&apps)
        .map_err(|e| failed(e.to_string()))?;

    let summary = parallel_extract(
        archive,
        staging.path(),
        is_application_entry,
        &ExtractOptions::default(),
    )
    .map_err(|e| failed(e.to_string()))?;
    if summary.failed > 0 {
        return Err(failed(format!(
            "{} of {} entries failed to extract",
            summary.failed, summary.scheduled
        )));
    }

    if let Err(e) = fs::rename(staging.path(), &app_root) {
        // Another boot of the same archive won the race.
        if !app_root.is_dir() {
            return Err(failed(e.to_string()));
        }
    }
    info!("Unpacked {:?} into {:?}", archive, app_root);
    Ok(app_root)
}
