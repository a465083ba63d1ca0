//! Path checks for extracting untrusted entry names

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::error;

/// Resolve an archive entry name below `base`, rejecting names that could
/// land anywhere else.
///
/// `base` must exist. The result is rooted at its canonical form.
pub fn sanitize_path(base: &Path, untrusted: &Path) -> Result<PathBuf> {
    let canonical_base = base
        .canonicalize()
        .map_err(|e| Error::InvalidPath(format!("Cannot canonicalize base path: {}", e)))?;
    let mut result = canonical_base.clone();

    for component in untrusted.components() {
        match component {
            Component::Normal(name) => {
                result.push(name);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                error!(path = ?untrusted, "Path contains parent directory component");
                return Err(Error::InvalidPath(format!(
                    "Path traversal attempt detected: {:?}",
                    untrusted
                )));
            }
            Component::RootDir => {
                error!(path = ?untrusted, "Path is absolute");
                return Err(Error::InvalidPath(format!(
                    "Absolute path not allowed: {:?}",
                    untrusted
                )));
            }
            Component::Prefix(_) => {
                error!(path = ?untrusted, "Path contains Windows prefix");
                return Err(Error::InvalidPath(format!(
                    "Windows path prefix not allowed: {:?}",
                    untrusted
                )));
            }
        }
    }

    if result == canonical_base {
        return Err(Error::InvalidPath(format!(
            "Entry name {:?} does not name a file",
            untrusted
        )));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexcz_testing::TestDir;

    #[test]
    fn test_sanitize_normal_paths() {
        let test_dir = TestDir::new().unwrap();
        let base = test_dir.path().canonicalize().unwrap();

        assert_eq!(
            sanitize_path(&base, Path::new("app/main.py")).unwrap(),
            base.join("app").join("main.py")
        );
        assert_eq!(
            sanitize_path(&base, Path::new("./app/./main.py")).unwrap(),
            base.join("app").join("main.py")
        );
    }

    #[test]
    fn test_sanitize_rejects_escapes() {
        let test_dir = TestDir::new().unwrap();
        let base = test_dir.path();

        assert!(sanitize_path(base, Path::new("../evil.py")).is_err());
        assert!(sanitize_path(base, Path::new("app/../../evil.py")).is_err());
        assert!(sanitize_path(base, Path::new("/etc/passwd")).is_err());
        assert!(sanitize_path(base, Path::new("")).is_err());
        assert!(sanitize_path(base, Path::new("./")).is_err());
    }

    #[cfg(windows)]
    #[test]
    fn test_sanitize_rejects_drive_prefix() {
        let test_dir = TestDir::new().unwrap();
        assert!(sanitize_path(test_dir.path(), Path::new("C:\\evil.py")).is_err());
    }

    #[test]
    fn test_missing_base() {
        let test_dir = TestDir::new().unwrap();
        let base = test_dir.path().join("missing");
        assert!(sanitize_path(&base, Path::new("a.py")).is_err());
    }
}
