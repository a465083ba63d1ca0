//! Parallel extraction
//!
//! A zip read handle cannot be shared between threads, so every worker in
//! the pool opens the archive on its own. Tasks look up their worker's
//! handle by rayon thread index; two tasks on the same worker never run at
//! the same time, so each handle only ever sees one reader.
//!
//! A failed task is logged and counted. It never stops its siblings.

use crate::archive::{Entry, SourceArchive};
use crate::security::sanitize_path;
use crate::{Error, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tuning for [`parallel_extract`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Worker count; one per CPU when unset. Never more than the number
    /// of scheduled entries.
    pub workers: Option<usize>,
    /// Size of each worker's copy buffer
    pub buffer_size: usize,
}

impl ExtractOptions {
    pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Default::default()
        }
    }

    fn pool_size(&self, tasks: usize) -> usize {
        let requested = self.workers.unwrap_or_else(rayon::current_num_threads);
        requested.clamp(1, tasks.max(1))
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            workers: None,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Outcome of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    /// File entries handed to the pool
    pub scheduled: usize,
    /// Entries written successfully
    pub extracted: usize,
    /// Entries whose task failed
    pub failed: usize,
}

/// Extract every file entry accepted by `include` into `dest`.
///
/// Directory entries are never scheduled; directories are created as
/// parents of extracted files. Errors opening the archive or enumerating
/// entries fail the whole call, errors inside a task only fail that task.
pub fn parallel_extract<P, Q, F>(
    archive: P,
    dest: Q,
    include: F,
    options: &ExtractOptions,
) -> Result<ExtractSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: Fn(&Entry) -> bool,
{
    let archive = archive.as_ref();
    let dest = dest.as_ref();
    let start = Instant::now();

    let mut source = SourceArchive::open(archive)?;
    let mut tasks = Vec::new();
    for entry in source.entries() {
        let entry = entry?;
        if !entry.is_dir && include(&entry) {
            tasks.push(entry);
        }
    }
    source.close()?;

    fs::create_dir_all(dest)?;
    let mut summary = ExtractSummary {
        scheduled: tasks.len(),
        ..Default::default()
    };
    if tasks.is_empty() {
        return Ok(summary);
    }

    let workers = options.pool_size(tasks.len());
    let handles = (0..workers)
        .map(|_| SourceArchive::open(archive).map(Mutex::new))
        .collect::<Result<Vec<_>>>()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("pexcz-extract-{index}"))
        .build()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;

    info!(
        "Extracting {} entries from {:?} with {} workers",
        tasks.len(),
        archive,
        workers
    );

    let buffer_size = options.buffer_size.max(1);
    let failed = pool.install(|| {
        tasks
            .par_iter()
            .filter(|entry| {
                let worker = rayon::current_thread_index().unwrap_or(0) % workers;
                let mut handle = lock(&handles[worker]);
                match extract_entry(&mut handle, entry, dest, buffer_size) {
                    Ok(()) => {
                        debug!(worker, index = entry.index, name = %entry.name, "Extracted entry");
                        false
                    }
                    Err(e) => {
                        warn!(index = entry.index, name = %entry.name, "Failed to extract entry: {}", e);
                        true
                    }
                }
            })
            .count()
    });

    summary.failed = failed;
    summary.extracted = summary.scheduled - failed;
    info!(
        "Extracted {} of {} entries in {:?}",
        summary.extracted,
        summary.scheduled,
        start.elapsed()
    );
    Ok(summary)
}

/// Extract every file entry with the given options
pub fn extract_all<P, Q>(archive: P, dest: Q, options: &ExtractOptions) -> Result<ExtractSummary>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    parallel_extract(archive, dest, |_| true, options)
}

fn lock(handle: &Mutex<SourceArchive>) -> MutexGuard<'_, SourceArchive> {
    // A panicking task leaves the handle itself intact.
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn extract_entry(
    source: &mut SourceArchive,
    entry: &Entry,
    dest: &Path,
    buffer_size: usize,
) -> Result<()> {
    let target = sanitize_path(dest, Path::new(&entry.name))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = source.reader(entry)?;
    let mut output = File::create(&target)?;
    let mut buffer = vec![0u8; buffer_size];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        output.write_all(&buffer[..read])?;
    }
    output.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode {
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size() {
        let options = ExtractOptions::with_workers(8);
        assert_eq!(options.pool_size(3), 3);
        assert_eq!(options.pool_size(100), 8);
        assert_eq!(ExtractOptions::with_workers(0).pool_size(5), 1);
        assert_eq!(ExtractOptions::default().pool_size(1), 1);
    }

    #[test]
    fn test_default_buffer() {
        assert_eq!(ExtractOptions::default().buffer_size, 256 * 1024);
    }
}
