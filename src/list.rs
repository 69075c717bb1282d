//! Ordered, deduplicated, file-backed record lists.
//!
//! History and favorites are the same machine with different policies: an
//! ordered sequence of shared book records mirroring one settings file,
//! reloaded when that file changes under us and rewritten whenever the
//! sequence changes. The [`ListShape`] trait carries everything the two
//! lists do differently.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::book::BookRecord;
use crate::cache::{CachedTable, RefreshOutcome};
use crate::error::Result;
use crate::paths::Storage;
use crate::value::{Table, Value};

/// The shared canonical-path -> record map owned by the library facade.
pub(crate) type BookMap = HashMap<PathBuf, Rc<BookRecord>>;

const FILE_FIELD: &str = "file";
const FAVORITES_KEY: &str = "favorites";

/// Favorites ranks are renumbered densely from this base on every rewrite.
const RANK_BASE: i64 = 1;

/// Returns the record for `path`, registering a new one in the shared map
/// when it is not yet known.
pub(crate) fn fetch_or_create(books: &mut BookMap, path: &Path) -> Result<Rc<BookRecord>> {
    if let Some(book) = books.get(path) {
        return Ok(Rc::clone(book));
    }
    let book = Rc::new(BookRecord::new(path)?);
    books.insert(path.to_path_buf(), Rc::clone(&book));
    Ok(book)
}

/// Per-list policy: where entries live in the backing table, how they are
/// keyed and ordered, which of two duplicates survives, and how the
/// sequence is rewritten.
pub(crate) trait ListShape {
    /// Name used in log and error text.
    const NAME: &'static str;
    /// Entry field holding the ordering value.
    const ORDER_FIELD: &'static str;

    /// The subtable holding the entries, if present.
    fn entries(tree: &Table) -> Option<&Table>;
    /// True when an entry keyed `a` sorts before one keyed `b`. Equal keys
    /// never precede each other, so ties keep file order.
    fn precedes(a: i64, b: i64) -> bool;
    /// True when a duplicate keyed `new` replaces the kept occurrence
    /// keyed `kept`.
    fn supersedes(new: i64, kept: i64) -> bool;
    /// Applied to every entry that survives a load.
    fn on_load(book: &BookRecord, key: i64);
    /// Applied to a record added through the API.
    fn on_add(book: &BookRecord);
    /// Builds the full backing table for the current sequence. `previous`
    /// is the last decoded table, for shapes that nest their entries and
    /// must preserve sibling keys.
    fn rebuild(books: &[Rc<BookRecord>], previous: Option<&Table>) -> Table;
}

/// Reading history: most recently read first, keyed by Unix time.
pub(crate) struct HistoryShape;

impl ListShape for HistoryShape {
    const NAME: &'static str = "history";
    const ORDER_FIELD: &'static str = "time";

    fn entries(tree: &Table) -> Option<&Table> {
        Some(tree)
    }

    fn precedes(a: i64, b: i64) -> bool {
        a > b
    }

    fn supersedes(new: i64, kept: i64) -> bool {
        new > kept
    }

    fn on_load(book: &BookRecord, key: i64) {
        book.set_last_read(key);
    }

    fn on_add(book: &BookRecord) {
        book.set_last_read(Utc::now().timestamp());
    }

    fn rebuild(books: &[Rc<BookRecord>], _previous: Option<&Table>) -> Table {
        let mut tree = Table::new();
        for (position, book) in books.iter().enumerate() {
            tree.insert(
                (position + 1).to_string(),
                entry(book, Self::ORDER_FIELD, book.last_read()),
            );
        }
        tree
    }
}

/// Favorites: ascending explicit rank, rewritten densely from
/// [`RANK_BASE`]. Lives in the `favorites` subtable of the collection
/// file; sibling keys of that file are preserved on rewrite.
pub(crate) struct FavoritesShape;

impl ListShape for FavoritesShape {
    const NAME: &'static str = "favorites";
    const ORDER_FIELD: &'static str = "order";

    fn entries(tree: &Table) -> Option<&Table> {
        tree.get(FAVORITES_KEY).and_then(Value::as_table)
    }

    fn precedes(a: i64, b: i64) -> bool {
        a < b
    }

    fn supersedes(new: i64, kept: i64) -> bool {
        new < kept
    }

    fn on_load(_book: &BookRecord, _key: i64) {}

    fn on_add(_book: &BookRecord) {}

    fn rebuild(books: &[Rc<BookRecord>], previous: Option<&Table>) -> Table {
        let mut entries = Table::new();
        for (position, book) in books.iter().enumerate() {
            entries.insert(
                (position + 1).to_string(),
                entry(book, Self::ORDER_FIELD, position as i64 + RANK_BASE),
            );
        }
        let mut tree = previous.cloned().unwrap_or_default();
        tree.insert(FAVORITES_KEY.to_string(), Value::Table(entries));
        tree
    }
}

fn entry(book: &BookRecord, order_field: &str, key: i64) -> Value {
    let mut table = Table::new();
    table.insert(
        FILE_FIELD.to_string(),
        Value::Str(book.file_path().to_string_lossy().into_owned()),
    );
    table.insert(order_field.to_string(), Value::from(key));
    Value::Table(table)
}

/// An ordered, deduplicated sequence of shared records mirroring one
/// settings file.
pub(crate) struct RecordList<S: ListShape> {
    cache: CachedTable,
    books: Vec<Rc<BookRecord>>,
    _shape: PhantomData<S>,
}

impl<S: ListShape> RecordList<S> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            cache: CachedTable::new(path),
            books: Vec::new(),
            _shape: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        self.cache.path()
    }

    pub fn books(&self) -> &[Rc<BookRecord>] {
        &self.books
    }

    /// Reloads the sequence when the backing file changed on disk.
    ///
    /// A file that fails to read or decode leaves the previous sequence in
    /// place (stale, retried on the next call). Duplicate entries for one
    /// canonical path are resolved by the shape's survivor rule, and a
    /// file found to contain duplicates is immediately rewritten
    /// normalized.
    pub fn refresh(&mut self, books: &mut BookMap, storage: &Storage) {
        if self.cache.refresh() != RefreshOutcome::Reloaded {
            return;
        }
        let entries = match self.cache.tree().and_then(S::entries) {
            Some(entries) => entries.clone(),
            None => {
                // decoded fine but holds no entry table at all
                self.books.clear();
                return;
            }
        };

        let mut sequence: Vec<Rc<BookRecord>> = Vec::with_capacity(entries.len());
        let mut keys: Vec<i64> = Vec::with_capacity(entries.len());
        let mut duplicates = false;
        for entry in entries.values() {
            let Some(entry) = entry.as_table() else { continue };
            let Some(file) = entry.get(FILE_FIELD).and_then(Value::as_str) else {
                continue;
            };
            let Some(key) = entry.get(S::ORDER_FIELD).and_then(Value::as_i64) else {
                continue;
            };
            let path = storage.canonical(Path::new(file));
            let book = match fetch_or_create(books, &path) {
                Ok(book) => book,
                Err(err) => {
                    warn!(list = S::NAME, %err, "skipping unusable entry");
                    continue;
                }
            };
            if let Some(kept) = sequence.iter().position(|b| *b == book) {
                duplicates = true;
                if S::supersedes(key, keys[kept]) {
                    sequence.remove(kept);
                    keys.remove(kept);
                } else {
                    continue;
                }
            }
            let position = keys
                .iter()
                .position(|&other| S::precedes(key, other))
                .unwrap_or(keys.len());
            S::on_load(&book, key);
            sequence.insert(position, book);
            keys.insert(position, key);
        }
        debug!(list = S::NAME, count = sequence.len(), "loaded list");
        self.books = sequence;
        if duplicates {
            warn!(list = S::NAME, "found duplicate entries, rewriting file");
            if let Err(err) = self.persist() {
                warn!(list = S::NAME, %err, "failed to rewrite deduplicated list");
            }
        }
    }

    /// Moves `book` to the front of the sequence and rewrites the file.
    pub fn add(&mut self, book: Rc<BookRecord>) -> Result<()> {
        self.books.retain(|b| *b != book);
        S::on_add(&book);
        self.books.insert(0, book);
        self.persist()
    }

    /// Removes `book` if present and rewrites the file. `Ok(false)` means
    /// the book was not in the sequence and the file was left untouched.
    pub fn remove(&mut self, book: &BookRecord) -> Result<bool> {
        let Some(position) = self.books.iter().position(|b| b.as_ref() == book) else {
            return Ok(false);
        };
        self.books.remove(position);
        self.persist()?;
        Ok(true)
    }

    fn persist(&mut self) -> Result<()> {
        let tree = S::rebuild(&self.books, self.cache.tree());
        self.cache.persist(&tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lua;
    use crate::value::TableExt;
    use std::fs;

    fn setup() -> (tempfile::TempDir, BookMap, Storage) {
        (tempfile::tempdir().unwrap(), BookMap::new(), Storage::default())
    }

    fn history_file(entries: &[(&str, i64)]) -> String {
        let mut out = String::from("return {\n");
        for (i, (file, time)) in entries.iter().enumerate() {
            out.push_str(&format!(
                "    [{}] = {{\n        [\"file\"] = \"{file}\",\n        [\"time\"] = {time},\n    }},\n",
                i + 1
            ));
        }
        out.push_str("}\n");
        out
    }

    fn collection_file(entries: &[(&str, i64)]) -> String {
        let mut out = String::from("return {\n    [\"favorites\"] = {\n");
        for (i, (file, order)) in entries.iter().enumerate() {
            out.push_str(&format!(
                "        [{}] = {{\n            [\"file\"] = \"{file}\",\n            [\"order\"] = {order},\n        }},\n",
                i + 1
            ));
        }
        out.push_str("    },\n}\n");
        out
    }

    fn paths_of(list: &[Rc<BookRecord>]) -> Vec<String> {
        list.iter()
            .map(|b| b.file_path().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_history_loads_descending_by_time() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(
            &path,
            history_file(&[("/b/old.epub", 100), ("/b/new.epub", 300), ("/b/mid.epub", 200)]),
        )
        .unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);

        assert_eq!(
            paths_of(list.books()),
            ["/b/new.epub", "/b/mid.epub", "/b/old.epub"]
        );
        assert_eq!(list.books()[0].last_read(), 300);
        assert_eq!(books.len(), 3);
    }

    #[test]
    fn test_history_ties_keep_file_order() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(
            &path,
            history_file(&[("/b/first.epub", 200), ("/b/second.epub", 200)]),
        )
        .unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);

        assert_eq!(paths_of(list.books()), ["/b/first.epub", "/b/second.epub"]);
    }

    #[test]
    fn test_history_duplicate_keeps_larger_time_and_rewrites() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(
            &path,
            history_file(&[
                ("/b/dup.epub", 100),
                ("/b/other.epub", 150),
                ("/b/dup.epub", 400),
            ]),
        )
        .unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);

        assert_eq!(paths_of(list.books()), ["/b/dup.epub", "/b/other.epub"]);
        assert_eq!(list.books()[0].last_read(), 400);
        assert_eq!(books.len(), 2);

        // self-heal: the file was rewritten deduplicated
        let tree = lua::decode(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(tree.len(), 2);
        let first = tree.get("1").and_then(Value::as_table).unwrap();
        assert_eq!(first.get("file").and_then(Value::as_str), Some("/b/dup.epub"));
        assert_eq!(first.get("time").and_then(Value::as_i64), Some(400));
    }

    #[test]
    fn test_favorites_loads_ascending_and_dedups_by_smaller_order() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("collection.lua");
        fs::write(
            &path,
            collection_file(&[
                ("/b/y.epub", 2),
                ("/b/x.epub", 1),
                ("/b/y.epub", 5),
            ]),
        )
        .unwrap();

        let mut list: RecordList<FavoritesShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);

        assert_eq!(paths_of(list.books()), ["/b/x.epub", "/b/y.epub"]);

        // rewritten with dense ranks from the base
        let tree = lua::decode(&fs::read_to_string(&path).unwrap()).unwrap();
        let favorites = tree.get("favorites").and_then(Value::as_table).unwrap();
        assert_eq!(favorites.len(), 2);
        let first = favorites.get("1").and_then(Value::as_table).unwrap();
        assert_eq!(first.get("file").and_then(Value::as_str), Some("/b/x.epub"));
        assert_eq!(first.get("order").and_then(Value::as_i64), Some(1));
        let second = favorites.get("2").and_then(Value::as_table).unwrap();
        assert_eq!(second.get("order").and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn test_favorites_rewrite_preserves_sibling_keys() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("collection.lua");
        fs::write(
            &path,
            "return {\n    [\"settings\"] = {\n        [\"sort\"] = \"manual\",\n    },\n    [\"favorites\"] = {\n        [1] = {\n            [\"file\"] = \"/b/x.epub\",\n            [\"order\"] = 1,\n        },\n    },\n}\n",
        )
        .unwrap();

        let mut list: RecordList<FavoritesShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);
        let book = books.get(Path::new("/b/x.epub")).unwrap().clone();
        list.remove(&book).unwrap();

        let tree = lua::decode(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            tree.get_path(&["settings", "sort"]).and_then(Value::as_str),
            Some("manual")
        );
        let favorites = tree.get("favorites").and_then(Value::as_table).unwrap();
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_add_moves_to_front_and_persists() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(&path, history_file(&[("/b/b.epub", 100)])).unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);

        let a = fetch_or_create(&mut books, Path::new("/b/a.epub")).unwrap();
        list.add(a).unwrap();
        assert_eq!(paths_of(list.books()), ["/b/a.epub", "/b/b.epub"]);

        // re-adding an existing book moves it, never duplicates it
        let b = books.get(Path::new("/b/b.epub")).unwrap().clone();
        list.add(b).unwrap();
        assert_eq!(paths_of(list.books()), ["/b/b.epub", "/b/a.epub"]);

        let tree = lua::decode(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_absent_book_leaves_file_untouched() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(&path, history_file(&[("/b/b.epub", 100)])).unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);
        let before = fs::read_to_string(&path).unwrap();

        let ghost = BookRecord::new("/b/ghost.epub").unwrap();
        assert!(!list.remove(&ghost).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_stale_list_survives_corrupt_rewrite() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(&path, history_file(&[("/b/b.epub", 100)])).unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);
        assert_eq!(list.books().len(), 1);

        fs::write(&path, "return { broken").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(9_999))
            .unwrap();

        list.refresh(&mut books, &storage);
        assert_eq!(paths_of(list.books()), ["/b/b.epub"]);
    }

    #[test]
    fn test_entries_with_missing_fields_are_skipped() {
        let (dir, mut books, storage) = setup();
        let path = dir.path().join("history.lua");
        fs::write(
            &path,
            "return {\n    [1] = {\n        [\"file\"] = \"/b/ok.epub\",\n        [\"time\"] = 100,\n    },\n    [2] = {\n        [\"file\"] = \"/b/no-time.epub\",\n    },\n    [3] = \"not a table\",\n}\n",
        )
        .unwrap();

        let mut list: RecordList<HistoryShape> = RecordList::new(&path);
        list.refresh(&mut books, &storage);
        assert_eq!(paths_of(list.books()), ["/b/ok.epub"]);
    }
}
