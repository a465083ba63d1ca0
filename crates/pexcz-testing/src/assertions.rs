//! Common assertions for pexcz testing

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Asserts that two directory trees hold the same files with the same content
pub fn assert_dirs_equal(dir1: &Path, dir2: &Path) -> Result<()> {
    let entries1 = collect_entries(dir1)?;
    let entries2 = collect_entries(dir2)?;

    assert_eq!(
        entries1, entries2,
        "Directory layouts differ between {:?} and {:?}",
        dir1, dir2
    );

    for relative in &entries1 {
        let path1 = dir1.join(relative);
        let path2 = dir2.join(relative);
        let meta1 = std::fs::metadata(&path1)?;
        let meta2 = std::fs::metadata(&path2)?;

        assert_eq!(
            meta1.is_file(),
            meta2.is_file(),
            "File type mismatch for {:?}",
            relative
        );

        if meta1.is_file() {
            let content1 = std::fs::read(&path1)?;
            let content2 = std::fs::read(&path2)?;
            assert!(content1 == content2, "Content mismatch for {:?}", relative);
        }
    }

    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode() & 0o777;

    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );

    Ok(())
}

/// Asserts that `values` never decrease and never exceed `bound`
pub fn assert_monotonic(values: &[u64], bound: u64) {
    for window in values.windows(2) {
        assert!(
            window[0] <= window[1],
            "Progress went backwards: {:?}",
            values
        );
    }
    if let Some(max) = values.iter().max() {
        assert!(*max <= bound, "Progress {} exceeds total {}", max, bound);
    }
}

fn collect_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        entries.push(entry.path().strip_prefix(dir)?.to_path_buf());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestDir;

    #[test]
    fn test_equal_trees() {
        let left = TestDir::new().unwrap();
        let right = TestDir::new().unwrap();
        for dir in [&left, &right] {
            dir.create_file("a/b.txt", b"b").unwrap();
            dir.create_file("c.txt", b"c").unwrap();
        }
        assert_dirs_equal(left.path(), right.path()).unwrap();
    }

    #[test]
    #[should_panic(expected = "Content mismatch")]
    fn test_content_mismatch() {
        let left = TestDir::new().unwrap();
        let right = TestDir::new().unwrap();
        left.create_file("c.txt", b"left").unwrap();
        right.create_file("c.txt", b"right").unwrap();
        assert_dirs_equal(left.path(), right.path()).unwrap();
    }

    #[test]
    fn test_monotonic() {
        assert_monotonic(&[0, 1, 1, 3], 3);
    }
}
