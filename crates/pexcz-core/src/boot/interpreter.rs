//! Interpreter resolution

use super::env::EnvSource;
use std::io;
use std::path::{Path, PathBuf};

/// Turns the interpreter named by a boot request into an executable path
pub trait InterpreterResolver {
    fn resolve(&self, interpreter: &Path, env: &dyn EnvSource) -> io::Result<PathBuf>;
}

/// Accepts paths to executable files and looks bare names up on `PATH`
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl InterpreterResolver for PathResolver {
    fn resolve(&self, interpreter: &Path, env: &dyn EnvSource) -> io::Result<PathBuf> {
        if interpreter.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no interpreter given",
            ));
        }

        if is_bare_name(interpreter) {
            let cwd = std::env::current_dir()?;
            return which::which_in(interpreter, env.get("PATH"), cwd).map_err(|e| {
                io::Error::new(io::ErrorKind::NotFound, format!("not found on PATH: {}", e))
            });
        }

        let metadata = std::fs::metadata(interpreter)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        if !is_executable(&metadata) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "not executable",
            ));
        }
        Ok(interpreter.to_path_buf())
    }
}

fn is_bare_name(path: &Path) -> bool {
    !path.is_absolute() && path.parent().is_some_and(|p| p.as_os_str().is_empty())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::env::RawEnv;
    use pexcz_testing::TestDir;

    #[test]
    fn test_bare_names() {
        assert!(is_bare_name(Path::new("python3")));
        assert!(!is_bare_name(Path::new("./python3")));
        assert!(!is_bare_name(Path::new("bin/python3")));
        assert!(!is_bare_name(Path::new("/usr/bin/python3")));
    }

    #[test]
    fn test_missing_path() {
        let test_dir = TestDir::new().unwrap();
        let missing = test_dir.path().join("python-missing");
        let err = PathResolver
            .resolve(&missing, &RawEnv::default())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_directory_is_rejected() {
        let test_dir = TestDir::new().unwrap();
        assert!(PathResolver
            .resolve(test_dir.path(), &RawEnv::default())
            .is_err());
    }

    #[test]
    fn test_empty_name() {
        assert!(PathResolver
            .resolve(Path::new(""), &RawEnv::default())
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let test_dir = TestDir::new().unwrap();
        let python = test_dir.create_file("bin/fakepython", b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path_var = format!("PATH={}", test_dir.path().join("bin").display());
        let env = RawEnv::from_entries([path_var]);
        assert_eq!(
            PathResolver.resolve(Path::new("fakepython"), &env).unwrap(),
            python
        );

        let empty = RawEnv::from_entries(["PATH=/nonexistent-pexcz-dir"]);
        assert!(PathResolver.resolve(Path::new("fakepython"), &empty).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file() {
        use std::os::unix::fs::PermissionsExt;

        let test_dir = TestDir::new().unwrap();
        let python = test_dir.create_file("python", b"").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = PathResolver.resolve(&python, &RawEnv::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
