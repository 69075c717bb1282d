//! Path identity and settings-directory discovery.
//!
//! Books are keyed by canonical path. Some devices expose the same storage
//! under several mount points, so canonicalization also folds the known
//! alternate prefixes onto one configurable representative root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{KoshelfError, Result};

const STORAGE_ROOT_DEFAULT: &str = "/storage/emulated/0";

/// Mount prefixes that can address the same storage as the configured
/// root; all of them fold onto it.
const STORAGE_ALIASES: [&str; 4] = [
    "/storage/emulated/legacy",
    "/storage/emulated/0",
    "/mnt/sdcard",
    "/sdcard",
];

/// Subdirectory name that marks a settings directory.
const SETTINGS_DIR_NAME: &str = "koreader";

/// The storage-mount equivalence rule applied during canonicalization.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            root: PathBuf::from(STORAGE_ROOT_DEFAULT),
        }
    }
}

impl Storage {
    /// Uses `root` as the representative storage prefix. Fails unless it
    /// is an existing directory.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.is_dir() {
            Ok(Self { root })
        } else {
            Err(KoshelfError::Store(format!(
                "storage root {} is not a directory",
                root.display()
            )))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable identity for a book path: OS canonicalization (lexical
    /// cleanup when the file does not exist), then folding of the known
    /// storage-mount aliases onto the configured root.
    pub fn canonical(&self, path: &Path) -> PathBuf {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| normalize(path));
        for alias in STORAGE_ALIASES {
            if let Ok(rest) = resolved.strip_prefix(alias) {
                return self.root.join(rest);
            }
        }
        resolved
    }
}

/// Lexical cleanup for paths that cannot be resolved on disk: drops `.`
/// components and folds `..` onto the preceding component.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Probes each candidate root for a `koreader` settings directory.
pub fn locate_settings_dir<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| candidate.as_ref().join(SETTINGS_DIR_NAME))
        .find(|path| path.is_dir())
}

/// The conventional places a settings directory shows up on a device.
pub fn default_candidates(storage: &Storage) -> Vec<PathBuf> {
    vec![
        storage.root().to_path_buf(),
        PathBuf::from("/mnt/external_sd"),
        PathBuf::from("/mnt/extSdCard"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lexical() {
        assert_eq!(normalize(Path::new("./a.epub")), PathBuf::from("a.epub"));
        assert_eq!(
            normalize(Path::new("/books/./sub/../a.epub")),
            PathBuf::from("/books/a.epub")
        );
    }

    #[test]
    fn test_canonical_folds_storage_aliases() {
        let root = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(root.path()).unwrap();

        assert_eq!(
            storage.canonical(Path::new("/sdcard/books/a.epub")),
            root.path().join("books/a.epub")
        );
        assert_eq!(
            storage.canonical(Path::new("/storage/emulated/legacy/b.epub")),
            root.path().join("b.epub")
        );
        assert_eq!(
            storage.canonical(Path::new("/mnt/sdcard/c.epub")),
            root.path().join("c.epub")
        );
    }

    #[test]
    fn test_canonical_leaves_foreign_paths_alone() {
        let storage = Storage::default();
        assert_eq!(
            storage.canonical(Path::new("/elsewhere/a.epub")),
            PathBuf::from("/elsewhere/a.epub")
        );
    }

    #[test]
    fn test_canonical_resolves_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("real.epub");
        std::fs::write(&file, b"x").unwrap();

        let storage = Storage::default();
        let via_dot = dir.path().join(".").join("real.epub");
        assert_eq!(storage.canonical(&via_dot), storage.canonical(&file));
    }

    #[test]
    fn test_with_root_requires_directory() {
        assert!(Storage::with_root("/definitely/not/here").is_err());
    }

    #[test]
    fn test_locate_settings_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(locate_settings_dir(&[dir.path()]), None);

        std::fs::create_dir(dir.path().join(SETTINGS_DIR_NAME)).unwrap();
        assert_eq!(
            locate_settings_dir(&[Path::new("/nowhere"), dir.path()]),
            Some(dir.path().join(SETTINGS_DIR_NAME))
        );
    }
}
