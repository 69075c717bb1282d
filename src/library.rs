//! The [`Library`] facade over the reader application's settings tree.
//!
//! Owns the shared book map and the two file-backed lists, normalizes
//! every incoming path, and delegates ordering and persistence to the
//! lists. This is the only owner of [`BookRecord`] instances; everything
//! else holds shared handles resolved through it.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::book::BookRecord;
use crate::config::KoshelfConfig;
use crate::error::{KoshelfError, Result};
use crate::list::{fetch_or_create, BookMap, FavoritesShape, HistoryShape, RecordList};
use crate::paths::{self, Storage};

const HISTORY_FILE: &str = "history.lua";
const COLLECTION_FILE: &str = "settings/collection.lua";

pub struct Library {
    settings_dir: PathBuf,
    storage: Storage,
    books: BookMap,
    history: RecordList<HistoryShape>,
    favorites: RecordList<FavoritesShape>,
}

impl Library {
    /// Opens the library rooted at an existing settings directory.
    pub fn open(settings_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_storage(settings_dir, Storage::default())
    }

    /// Like [`open`](Self::open), with an explicit storage-mount rule.
    pub fn with_storage(settings_dir: impl Into<PathBuf>, storage: Storage) -> Result<Self> {
        let settings_dir = settings_dir.into();
        if !settings_dir.is_dir() {
            return Err(KoshelfError::Store(format!(
                "settings directory {} not found",
                settings_dir.display()
            )));
        }
        let history = RecordList::new(settings_dir.join(HISTORY_FILE));
        let favorites = RecordList::new(settings_dir.join(COLLECTION_FILE));
        debug!(dir = %settings_dir.display(), "opened library");
        Ok(Self {
            settings_dir,
            storage,
            books: BookMap::new(),
            history,
            favorites,
        })
    }

    /// Probes the conventional storage locations for a settings directory.
    pub fn discover(storage: Storage) -> Result<Self> {
        let candidates = paths::default_candidates(&storage);
        let dir = paths::locate_settings_dir(&candidates).ok_or_else(|| {
            KoshelfError::Store("could not locate a koreader settings directory".to_string())
        })?;
        Self::with_storage(dir, storage)
    }

    /// Opens using the host configuration: explicit directory and storage
    /// root when set, discovery otherwise.
    pub fn from_config(config: &KoshelfConfig) -> Result<Self> {
        let storage = match &config.storage_root {
            Some(root) => Storage::with_root(root)?,
            None => Storage::default(),
        };
        match &config.koreader_dir {
            Some(dir) => Self::with_storage(dir, storage),
            None => Self::discover(storage),
        }
    }

    pub fn settings_dir(&self) -> &Path {
        &self.settings_dir
    }

    pub fn history_path(&self) -> &Path {
        self.history.path()
    }

    pub fn collection_path(&self) -> &Path {
        self.favorites.path()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Registers a book without touching history or favorites. Fails when
    /// the path is already registered.
    pub fn add_to_library(&mut self, path: impl AsRef<Path>) -> Result<Rc<BookRecord>> {
        self.refresh_all();
        let path = self.storage.canonical(path.as_ref());
        if self.books.contains_key(&path) {
            return Err(KoshelfError::Store(format!(
                "book already in library: {}",
                path.display()
            )));
        }
        let book = Rc::new(BookRecord::new(&path)?);
        self.books.insert(path, Rc::clone(&book));
        Ok(book)
    }

    /// Moves the book to the front of the reading history, stamps its
    /// last-read time with the current time, and rewrites the history
    /// file. The book is registered first if unknown.
    pub fn add_to_history(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.history.refresh(&mut self.books, &self.storage);
        let path = self.storage.canonical(path.as_ref());
        let book = fetch_or_create(&mut self.books, &path)?;
        self.history.add(book)
    }

    /// Moves the book to the front of the favorites and rewrites the
    /// collection file. The book is registered first if unknown.
    pub fn add_to_favorites(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.favorites.refresh(&mut self.books, &self.storage);
        let path = self.storage.canonical(path.as_ref());
        let book = fetch_or_create(&mut self.books, &path)?;
        self.favorites.add(book)
    }

    /// Removes the book from the history list. The record stays in the
    /// library.
    pub fn remove_from_history(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.history.refresh(&mut self.books, &self.storage);
        let book = self.lookup(path.as_ref())?;
        if self.history.remove(&book)? {
            Ok(())
        } else {
            Err(KoshelfError::Store(format!(
                "book not in history: {}",
                book.file_path().display()
            )))
        }
    }

    /// Removes the book from the favorites. The record stays in the
    /// library.
    pub fn remove_from_favorites(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.favorites.refresh(&mut self.books, &self.storage);
        let book = self.lookup(path.as_ref())?;
        if self.favorites.remove(&book)? {
            Ok(())
        } else {
            Err(KoshelfError::Store(format!(
                "book not in favorites: {}",
                book.file_path().display()
            )))
        }
    }

    /// Removes the book from history, favorites and the library map.
    ///
    /// Each list is rewritten only if the book was actually in it. The map
    /// entry is evicted only when every attempted rewrite succeeded; on
    /// any write failure the record stays reachable (even though a list
    /// may already have dropped it in memory) so the caller can retry.
    pub fn remove_from_library(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.refresh_all();
        let book = self.lookup(path.as_ref())?;
        let history = self.history.remove(&book);
        let favorites = self.favorites.remove(&book);
        history?;
        favorites?;
        self.books.remove(book.file_path());
        Ok(())
    }

    /// Looks up a registered book.
    pub fn book(&mut self, path: impl AsRef<Path>) -> Option<Rc<BookRecord>> {
        self.refresh_all();
        let path = self.storage.canonical(path.as_ref());
        self.books.get(&path).cloned()
    }

    /// The reading history, most recently read first.
    pub fn history(&mut self) -> Vec<Rc<BookRecord>> {
        self.history.refresh(&mut self.books, &self.storage);
        self.history.books().to_vec()
    }

    /// The favorites, most recently added first.
    pub fn favorites(&mut self) -> Vec<Rc<BookRecord>> {
        self.favorites.refresh(&mut self.books, &self.storage);
        self.favorites.books().to_vec()
    }

    /// Every known book: everything registered directly plus everything
    /// imported through the history and favorites files.
    pub fn books(&mut self) -> Vec<Rc<BookRecord>> {
        self.refresh_all();
        self.books.values().cloned().collect()
    }

    fn lookup(&self, path: &Path) -> Result<Rc<BookRecord>> {
        let path = self.storage.canonical(path);
        self.books
            .get(&path)
            .cloned()
            .ok_or_else(|| KoshelfError::UnknownBook(path.display().to_string()))
    }

    fn refresh_all(&mut self) {
        self.history.refresh(&mut self.books, &self.storage);
        self.favorites.refresh(&mut self.books, &self.storage);
    }
}
