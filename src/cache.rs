//! File-backed cache for one decoded settings table.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::Result;
use crate::lua;
use crate::value::Table;

/// Result of a [`CachedTable::refresh`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The file changed on disk and the cache now holds its new contents.
    Reloaded,
    /// The file has not changed since the last successful read.
    Unchanged,
    /// The file could not be read or decoded; the previous cache is kept
    /// and the next call retries.
    ReadFailed,
}

/// One settings file plus the last tree successfully decoded from it.
///
/// Reloads lazily by comparing modification times, so edits made by the
/// reader application between calls are picked up without re-reading
/// unchanged files. A failed read or decode never replaces a previously
/// good tree and never advances the remembered timestamp.
#[derive(Debug)]
pub struct CachedTable {
    path: PathBuf,
    modified: Option<SystemTime>,
    tree: Option<Table>,
}

impl CachedTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            tree: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last successfully decoded tree, if any.
    pub fn tree(&self) -> Option<&Table> {
        self.tree.as_ref()
    }

    pub fn refresh(&mut self) -> RefreshOutcome {
        let modified = match fs::metadata(&self.path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => return RefreshOutcome::ReadFailed,
        };
        if self.modified == Some(modified) {
            return RefreshOutcome::Unchanged;
        }
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read settings file");
                return RefreshOutcome::ReadFailed;
            }
        };
        match lua::decode(&text) {
            Ok(tree) => {
                debug!(path = %self.path.display(), entries = tree.len(), "reloaded settings file");
                self.tree = Some(tree);
                self.modified = Some(modified);
                RefreshOutcome::Reloaded
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    %err,
                    "failed to decode settings file, keeping previous contents"
                );
                RefreshOutcome::ReadFailed
            }
        }
    }

    /// Encodes `tree` and overwrites the backing file with it, then adopts
    /// it as the cached contents.
    ///
    /// The write replaces the whole file and is not atomic; a crash
    /// mid-write can leave a truncated file behind.
    pub fn persist(&mut self, tree: &Table) -> Result<()> {
        let text = lua::encode(tree);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, text)?;
        self.modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();
        self.tree = Some(tree.clone());
        Ok(())
    }
}
