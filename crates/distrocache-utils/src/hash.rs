use std::path::Path;

use walkdir::WalkDir;

use crate::error::{HashError, HashResult};

/// Digest of a directory tree, as produced by [`tree_digest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDigest {
    pub hex: String,
    pub file_count: usize,
}

/// Calculates the blake3 checksum of a single file.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn calculate_checksum<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(file_path).map_err(|err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    })?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Calculates a content digest for every regular file and symlink below `root`.
///
/// Entries are visited in file-name order and each contributes its path
/// relative to `root` followed by its own checksum (or link target), so two
/// trees with identical contents always produce the same digest regardless of
/// where they were extracted. Directories only contribute through their
/// contents.
///
/// # Errors
///
/// * [`HashError::WalkFailed`] if a directory cannot be listed.
/// * [`HashError::ReadFailed`] if a file or link cannot be read.
pub fn tree_digest<P: AsRef<Path>>(root: P) -> HashResult<TreeDigest> {
    let root = root.as_ref();
    let mut hasher = blake3::Hasher::new();
    let mut file_count = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            HashError::WalkFailed {
                root: root.to_path_buf(),
                source: err,
            }
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update(&[0]);

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|err| {
                HashError::ReadFailed {
                    path: entry.path().to_path_buf(),
                    source: err,
                }
            })?;
            hasher.update(b"link:");
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            hasher.update(calculate_checksum(entry.path())?.as_bytes());
        }
        hasher.update(&[0]);
        file_count += 1;
    }

    Ok(TreeDigest {
        hex: hasher.finalize().to_hex().to_string(),
        file_count,
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use tempfile::NamedTempFile;

    use super::{calculate_checksum, tree_digest};

    #[test]
    fn test_calculate_checksum() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();

        let checksum = calculate_checksum(file.path()).unwrap();
        assert_eq!(
            checksum,
            "dc5a4edb8240b018124052c330270696f96771a63b45250a5c17d3000e823355"
        );
    }

    #[test]
    fn test_calculate_checksum_file_not_found() {
        assert!(calculate_checksum("/path/to/nonexistent/file").is_err());
    }

    #[test]
    fn test_tree_digest_is_location_independent() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [a.path(), b.path()] {
            fs::create_dir_all(dir.join("pkg/src")).unwrap();
            fs::write(dir.join("pkg/package.xml"), "<package/>").unwrap();
            fs::write(dir.join("pkg/src/main.c"), "int main() {}").unwrap();
        }

        let da = tree_digest(a.path()).unwrap();
        let db = tree_digest(b.path()).unwrap();
        assert_eq!(da, db);
        assert_eq!(da.file_count, 2);
    }

    #[test]
    fn test_tree_digest_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        let before = tree_digest(dir.path()).unwrap();

        fs::write(dir.path().join("a.txt"), "two").unwrap();
        let after = tree_digest(dir.path()).unwrap();
        assert_ne!(before.hex, after.hex);
    }

    #[test]
    fn test_tree_digest_renamed_file_differs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "same").unwrap();
        let before = tree_digest(dir.path()).unwrap();

        fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
        let after = tree_digest(dir.path()).unwrap();
        assert_ne!(before.hex, after.hex);
    }

    #[test]
    fn test_tree_digest_missing_root() {
        assert!(tree_digest("/path/to/nonexistent/tree").is_err());
    }
}
