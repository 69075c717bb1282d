//! One book and the metadata kept in its sidecar file.
//!
//! The reader application stores per-book state next to the book itself:
//! `/books/novel.epub` gets `/books/novel.sdr/metadata.epub.lua`. The
//! record watches that file through a [`CachedTable`] and re-derives its
//! typed fields whenever the sidecar changes on disk.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::cache::{CachedTable, RefreshOutcome};
use crate::error::{KoshelfError, Result};
use crate::value::{Table, TableExt, Value};

const STATUS_COMPLETE: &str = "complete";
const STATUS_READING: &str = "reading";

/// A book, identified by its canonical file path.
///
/// Identity, equality and hashing are over the path alone. All metadata
/// getters refresh lazily from the sidecar; a field missing from the
/// sidecar is `None` (or `false` for the finished flag), not an error.
/// Interior mutability keeps the getters on `&self`; the crate is
/// single-threaded by contract.
pub struct BookRecord {
    file_path: PathBuf,
    sdr_path: PathBuf,
    state: RefCell<SdrState>,
}

struct SdrState {
    cache: CachedTable,
    last_read: i64,
    fields: BookFields,
}

#[derive(Debug, Clone, Default)]
struct BookFields {
    finished: bool,
    percent_finished: Option<f64>,
    pages: Option<u32>,
    title: Option<String>,
    authors: Option<Vec<String>>,
    keywords: Option<Vec<String>>,
    language: Option<String>,
    series: Option<String>,
}

impl BookFields {
    fn from_tree(tree: &Table) -> Self {
        Self {
            finished: tree
                .get_path(&["summary", "status"])
                .and_then(Value::as_str)
                .map(|status| status == STATUS_COMPLETE)
                .unwrap_or(false),
            percent_finished: tree.get("percent_finished").and_then(Value::as_f64),
            pages: tree
                .get_path(&["stats", "pages"])
                .and_then(Value::as_i64)
                .and_then(|pages| u32::try_from(pages).ok()),
            title: doc_prop_str(tree, "title"),
            authors: doc_prop_list(tree, "authors"),
            keywords: doc_prop_list(tree, "keywords"),
            language: doc_prop_str(tree, "language"),
            series: doc_prop_str(tree, "series"),
        }
    }
}

fn doc_prop_str(tree: &Table, key: &str) -> Option<String> {
    tree.get_path(&["doc_props", key])
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Authors and keywords are written either as a delimited list or, for a
/// single entry, as a plain string; a plain string reads back as a
/// one-element list.
fn doc_prop_list(tree: &Table, key: &str) -> Option<Vec<String>> {
    match tree.get_path(&["doc_props", key])? {
        Value::List(items) => Some(items.clone()),
        Value::Str(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

impl BookRecord {
    /// Creates a record for the book at `file_path`.
    ///
    /// The path must carry a filename extension; the sidecar location
    /// cannot be derived without one.
    pub fn new(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        let sdr_path = sdr_path(&file_path)?;
        Ok(Self {
            file_path,
            state: RefCell::new(SdrState {
                cache: CachedTable::new(&sdr_path),
                last_read: 0,
                fields: BookFields::default(),
            }),
            sdr_path,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn sdr_path(&self) -> &Path {
        &self.sdr_path
    }

    /// Whether the sidecar marks the book finished. `false` when there is
    /// no sidecar.
    pub fn finished(&self) -> bool {
        self.sync();
        self.state.borrow().fields.finished
    }

    /// Reading progress in `[0, 1]`.
    pub fn percent_finished(&self) -> Option<f64> {
        self.sync();
        self.state.borrow().fields.percent_finished
    }

    pub fn pages(&self) -> Option<u32> {
        self.sync();
        self.state.borrow().fields.pages
    }

    pub fn title(&self) -> Option<String> {
        self.sync();
        self.state.borrow().fields.title.clone()
    }

    pub fn authors(&self) -> Option<Vec<String>> {
        self.sync();
        self.state.borrow().fields.authors.clone()
    }

    pub fn keywords(&self) -> Option<Vec<String>> {
        self.sync();
        self.state.borrow().fields.keywords.clone()
    }

    pub fn language(&self) -> Option<String> {
        self.sync();
        self.state.borrow().fields.language.clone()
    }

    pub fn series(&self) -> Option<String> {
        self.sync();
        self.state.borrow().fields.series.clone()
    }

    /// Time of last reading, Unix seconds. Maintained by the history list
    /// in memory only; never read from the sidecar.
    pub fn last_read(&self) -> i64 {
        self.state.borrow().last_read
    }

    pub fn set_last_read(&self, time: i64) {
        self.state.borrow_mut().last_read = time;
    }

    /// Marks the book finished in its sidecar file.
    ///
    /// Fails without touching the file when the book is already finished.
    /// The in-memory flag flips only after the write succeeds.
    pub fn set_finished(&self) -> Result<()> {
        self.sync();
        let mut state = self.state.borrow_mut();
        if state.fields.finished {
            return Err(KoshelfError::Store(format!(
                "book already finished: {}",
                self.file_path.display()
            )));
        }
        let mut tree = state.cache.tree().cloned().unwrap_or_default();
        tree.set_path(&["summary", "status"], Value::from(STATUS_COMPLETE));
        state.cache.persist(&tree)?;
        state.fields.finished = true;
        Ok(())
    }

    /// Marks the book as still being read. Fails when it is not currently
    /// finished.
    pub fn set_reading(&self) -> Result<()> {
        self.sync();
        let mut state = self.state.borrow_mut();
        if !state.fields.finished {
            return Err(KoshelfError::Store(format!(
                "book not marked finished: {}",
                self.file_path.display()
            )));
        }
        let mut tree = state.cache.tree().cloned().unwrap_or_default();
        tree.set_path(&["summary", "status"], Value::from(STATUS_READING));
        state.cache.persist(&tree)?;
        state.fields.finished = false;
        Ok(())
    }

    /// Refreshes the sidecar cache and, when the file changed, re-derives
    /// every typed field from the new tree. A key missing from a rewritten
    /// sidecar unsets its field even if it was set before.
    fn sync(&self) {
        let mut state = self.state.borrow_mut();
        if state.cache.refresh() == RefreshOutcome::Reloaded {
            let fields = match state.cache.tree() {
                Some(tree) => BookFields::from_tree(tree),
                None => BookFields::default(),
            };
            state.fields = fields;
        }
    }
}

/// `/books/novel.epub` -> `/books/novel.sdr/metadata.epub.lua`
fn sdr_path(file_path: &Path) -> Result<PathBuf> {
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .ok_or_else(|| KoshelfError::MissingExtension {
            path: file_path.to_path_buf(),
        })?;
    Ok(file_path
        .with_extension("sdr")
        .join(format!("metadata.{extension}.lua")))
}

impl PartialEq for BookRecord {
    fn eq(&self, other: &Self) -> bool {
        self.file_path == other.file_path
    }
}

impl Eq for BookRecord {}

impl Hash for BookRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file_path.hash(state);
    }
}

impl fmt::Debug for BookRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookRecord")
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}
