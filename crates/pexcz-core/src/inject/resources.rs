//! Runtime files embedded into every transformed archive
//!
//! The bootstrap is imported by `zipimport` and the launcher library is
//! read with `zipfile`, so resources are always written with a method
//! every Python can read, whatever the policy's target compression is.

use super::policy::{Method, TargetCompression};
use crate::{Error, Result};
use std::borrow::Cow;
use std::env::consts;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Archive directory holding everything pexcz injects besides entry points
pub const RUNTIME_ROOT: &str = "__pexcz__/";

/// Archive directory holding the bootstrap package
pub const BOOTSTRAP_ROOT: &str = "__pexcz__/pexcz/";

/// Archive directory holding native launcher libraries
pub const NATIVE_LIB_ROOT: &str = "__pexcz__/pexcz/.lib/";

const BOOTSTRAP_INIT: &[u8] = include_bytes!("../../resources/python/pexcz/__init__.py");
const PEX_PACKAGE_INIT: &[u8] = include_bytes!("../../resources/python/__pex__/__init__.py");
const MAIN: &[u8] = include_bytes!("../../resources/python/__main__.py");

/// Compression of injected scripts
pub const SCRIPT_COMPRESSION: TargetCompression = TargetCompression {
    method: Method::Deflated,
    level: None,
};

/// Compression of injected native libraries
pub const LIBRARY_COMPRESSION: TargetCompression = TargetCompression {
    method: Method::Stored,
    level: None,
};

/// One entry added by the engine after the source entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub data: Cow<'static, [u8]>,
    pub compression: TargetCompression,
}

impl Resource {
    /// A script resource, deflated
    pub fn new(name: impl Into<String>, data: impl Into<Cow<'static, [u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            compression: SCRIPT_COMPRESSION,
        }
    }

    /// A native library resource, stored
    pub fn library(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            compression: LIBRARY_COMPRESSION,
        }
    }
}

/// The built-in resources, in the order they are injected.
///
/// `libraries` are placed between the bootstrap package and the
/// entry-point scripts.
pub fn default_resources(libraries: Vec<Resource>) -> Vec<Resource> {
    let mut resources = vec![Resource::new(
        format!("{BOOTSTRAP_ROOT}__init__.py"),
        BOOTSTRAP_INIT,
    )];
    resources.extend(libraries);
    resources.push(Resource::new("__pex__/__init__.py", PEX_PACKAGE_INIT));
    resources.push(Resource::new("__main__.py", MAIN));
    resources
}

/// Launcher libraries for an inject: every file under `native_lib_dir`
/// when one is configured, otherwise the library built alongside the
/// running executable.
pub fn launcher_libraries(native_lib_dir: Option<&Path>) -> Result<Vec<Resource>> {
    if let Some(dir) = native_lib_dir {
        return native_libraries(dir);
    }

    let found = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(find_native_library));
    match found {
        Some(path) => {
            let name = format!("{}{}/{}", NATIVE_LIB_ROOT, platform_id(), native_library_name());
            debug!(path = ?path, name = %name, "Embedding bundled launcher");
            Ok(vec![Resource::library(name, std::fs::read(&path)?)])
        }
        None => {
            warn!(
                "No {} found beside this executable; the archive will not boot until one is embedded",
                native_library_name()
            );
            Ok(Vec::new())
        }
    }
}

/// File name of the launcher library on this host
pub fn native_library_name() -> String {
    format!("{}pexcz_core{}", consts::DLL_PREFIX, consts::DLL_SUFFIX)
}

/// `{arch}-{os}[-{abi}]` directory the bootstrap loads its launcher from
pub fn platform_id() -> String {
    let arch = match consts::ARCH {
        "powerpc64" if cfg!(target_endian = "little") => "powerpc64le",
        arch => arch,
    };
    let os = consts::OS;
    if os == "linux" && arch != "arm" {
        let abi = if cfg!(target_env = "musl") { "musl" } else { "gnu" };
        format!("{arch}-{os}-{abi}")
    } else {
        format!("{arch}-{os}")
    }
}

/// The launcher library in `dir` or its `deps/` directory
pub fn find_native_library(dir: &Path) -> Option<PathBuf> {
    let name = native_library_name();
    [dir.join(&name), dir.join("deps").join(&name)]
        .into_iter()
        .find(|path| path.is_file())
}

/// Collect every file below `dir`, named relative to [`NATIVE_LIB_ROOT`]
pub fn native_libraries(dir: &Path) -> Result<Vec<Resource>> {
    if !dir.is_dir() {
        return Err(Error::InvalidPath(format!(
            "Native library directory {:?} is not a directory",
            dir
        )));
    }

    let mut resources = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let name = format!("{}{}", NATIVE_LIB_ROOT, components.join("/"));
        debug!(path = ?entry.path(), name = %name, "Embedding native library");
        resources.push(Resource::library(name, std::fs::read(entry.path())?));
    }
    Ok(resources)
}
