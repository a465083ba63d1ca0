//! Native boot sequencer
//!
//! Booting reads the archive's `PEX-INFO`, resolves the interpreter,
//! unpacks the application into the cache when a cache is given, builds
//! the interpreter's argument vector and environment, and hands the process
//! over to the interpreter. A successful boot never returns; every failure
//! comes back as exactly one [`Error`] and nothing is retried.

pub mod cache;
pub mod env;
pub mod exec;
pub mod interpreter;

pub use cache::{cache_dir, APP_ROOT_ENV, CACHE_ENV};
pub use env::{EnvSource, HostEnv, RawEnv};
pub use exec::{PlatformReplacer, ProcessReplacer};
pub use interpreter::{InterpreterResolver, PathResolver};

use crate::archive::SourceArchive;
use crate::inject::PEX_INFO;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Exit status reported when booting fails before the interpreter runs
pub const BOOT_ERROR_CODE: i32 = 75;

/// Variable through which the interpreter finds its archive
pub const PEX_ENV: &str = "PEX";

/// Boot metadata read from an archive's `PEX-INFO`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootTarget {
    pub entry_point: Option<String>,
    pub script: Option<String>,
    pub pex_hash: Option<String>,
    pub code_hash: Option<String>,
    pub venv: bool,
    pub interpreter_constraints: Vec<String>,
    pub inject_python_args: Vec<String>,
    pub inject_args: Vec<String>,
    pub inject_env: BTreeMap<String, String>,
}

/// What the booted archive runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTarget {
    /// `module` or `module:function`
    Module(String),
    /// A console script from one of the archive's distributions
    Script(String),
    /// No entry point; the archive drops into an interpreter
    Interpreter,
}

impl BootTarget {
    /// Parse a `PEX-INFO` document belonging to `archive`
    pub fn from_json(archive: &Path, data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| Error::ManifestInvalid {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Read the boot target of the archive at `archive`
    pub fn load(archive: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::ManifestInvalid {
            archive: archive.to_path_buf(),
            reason,
        };

        let mut source = SourceArchive::open(archive).map_err(|e| invalid(e.to_string()))?;
        let data = source
            .read_by_name(PEX_INFO)
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| invalid(format!("no {} entry", PEX_INFO)))?;
        source.close()?;
        Self::from_json(archive, &data)
    }

    pub fn entry(&self) -> EntryTarget {
        match (&self.entry_point, &self.script) {
            (Some(entry_point), _) => EntryTarget::Module(entry_point.clone()),
            (None, Some(script)) => EntryTarget::Script(script.clone()),
            (None, None) => EntryTarget::Interpreter,
        }
    }
}

/// One request to boot an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    /// Archive to boot
    pub archive: PathBuf,
    /// Interpreter path or bare program name
    pub interpreter: PathBuf,
    /// Flags placed before the archive path
    pub python_args: Vec<OsString>,
    /// Arguments placed after the archive path
    pub args: Vec<OsString>,
    /// A complete argument vector used as-is instead of composing one
    pub argv: Option<Vec<OsString>>,
    /// Cache root to unpack the application below; none runs it from the
    /// archive
    pub cache_dir: Option<PathBuf>,
}

impl BootRequest {
    pub fn new(archive: impl Into<PathBuf>, interpreter: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            interpreter: interpreter.into(),
            python_args: Vec::new(),
            args: Vec::new(),
            argv: None,
            cache_dir: None,
        }
    }

    pub fn python_args<I, S>(mut self, python_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.python_args = python_args.into_iter().map(Into::into).collect();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.argv = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    pub fn cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }
}

/// The fully resolved command a boot hands the process to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub program: PathBuf,
    pub argv: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
}

/// Resolves and performs boots
#[derive(Debug, Clone, Default)]
pub struct BootSequencer<R = PathResolver, X = PlatformReplacer> {
    resolver: R,
    replacer: X,
}

impl BootSequencer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: InterpreterResolver, X: ProcessReplacer> BootSequencer<R, X> {
    pub fn with_parts(resolver: R, replacer: X) -> Self {
        Self { resolver, replacer }
    }

    /// Work out what a boot of `request` would execute
    pub fn plan(&self, request: &BootRequest, env: &dyn EnvSource) -> Result<ExecPlan> {
        let target = BootTarget::load(&request.archive)?;
        let archive = std::path::absolute(&request.archive).map_err(|e| {
            Error::ManifestInvalid {
                archive: request.archive.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(archive = ?archive, entry = ?target.entry(), "Read boot target");

        let program = self
            .resolver
            .resolve(&request.interpreter, env)
            .map_err(|e| Error::InterpreterResolutionFailed {
                interpreter: request.interpreter.clone(),
                archive: request.archive.clone(),
                reason: e.to_string(),
            })?;

        let app_root = match &request.cache_dir {
            Some(cache_dir) => Some(cache::unpack(&archive, &target, cache_dir)?),
            None => None,
        };

        let argv = match &request.argv {
            Some(argv) => argv.clone(),
            None => compose_argv(&program, &archive, &target, request),
        };
        let env = compose_env(env, &archive, &target, app_root.as_deref());

        Ok(ExecPlan { program, argv, env })
    }

    /// Replace the current process with the interpreter booting the
    /// requested archive. Returns only on failure.
    pub fn boot(&self, request: &BootRequest, env: &dyn EnvSource) -> Result<Infallible> {
        let start = Instant::now();
        let result = self.plan(request, env).and_then(|plan| {
            info!("Booting {:?} with {:?}", request.archive, plan.program);
            debug!(argv = ?plan.argv, elapsed = ?start.elapsed(), "Handing over process");
            self.replacer
                .replace(&plan)
                .map_err(|e| Error::ExecFailed {
                    interpreter: plan.program.clone(),
                    archive: request.archive.clone(),
                    reason: e.to_string(),
                })
        });
        debug!(elapsed = ?start.elapsed(), "Boot failed");
        result
    }
}

fn compose_argv(
    program: &Path,
    archive: &Path,
    target: &BootTarget,
    request: &BootRequest,
) -> Vec<OsString> {
    let mut argv = vec![program.as_os_str().to_os_string()];
    argv.extend(target.inject_python_args.iter().map(OsString::from));
    argv.extend(request.python_args.iter().cloned());
    argv.push(archive.as_os_str().to_os_string());
    argv.extend(target.inject_args.iter().map(OsString::from));
    argv.extend(request.args.iter().cloned());
    argv
}

fn compose_env(
    base: &dyn EnvSource,
    archive: &Path,
    target: &BootTarget,
    app_root: Option<&Path>,
) -> Vec<(OsString, OsString)> {
    let mut env = base.vars();
    for (name, value) in &target.inject_env {
        if !env.iter().any(|(existing, _)| existing.as_os_str() == name.as_str()) {
            env.push((name.into(), value.into()));
        }
    }

    set_var(&mut env, PEX_ENV, archive.as_os_str());
    match app_root {
        Some(app_root) => set_var(&mut env, APP_ROOT_ENV, app_root.as_os_str()),
        // A stale root from an outer boot must not leak into this one.
        None => env.retain(|(name, _)| name.as_os_str() != APP_ROOT_ENV),
    }
    env
}

fn set_var(env: &mut Vec<(OsString, OsString)>, name: &str, value: &OsStr) {
    match env.iter_mut().find(|(existing, _)| existing.as_os_str() == name) {
        Some((_, existing)) => *existing = value.to_os_string(),
        None => env.push((name.into(), value.to_os_string())),
    }
}
