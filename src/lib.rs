//! # koshelf
//!
//! Koshelf lets a host application read and modify the state the KOReader
//! e-book reader keeps on disk: the reading history, the favorites
//! collection and the per-book metadata sidecars. KOReader persists all of
//! it as small Lua table literals, so the crate is built around a codec
//! for that dialect and a file-backed store on top of it.
//!
//! ## Layering
//!
//! ```text
//! Library (library.rs)
//!   - owns the canonical-path -> BookRecord map and the two lists
//!   - public add/remove/query surface, cascading removal policy
//!         │
//!         ▼
//! RecordList (list.rs)              BookRecord (book.rs)
//!   - ordered dedup sequence          - typed metadata accessors
//!   - history/favorites policies      - sidecar status writes
//!         │                                 │
//!         └────────────┬────────────────────┘
//!                      ▼
//! CachedTable (cache.rs)
//!   - mtime-gated lazy reload, whole-file rewrite
//!                      │
//!                      ▼
//! lua codec (lua.rs) over Value trees (value.rs)
//! ```
//!
//! Around the core: `paths` (canonical path identity and settings
//! discovery), `format` (one-line display rendering) and `config` (host
//! settings persistence).
//!
//! ## Consistency model
//!
//! KOReader itself rewrites these files between our calls, so every read
//! path is staleness-checked: each backing file's modification time is
//! compared on access and the file re-decoded when it changed. A file that
//! fails to read or parse never clobbers the last good in-memory state:
//! the failure is reported, the previous state kept, and the reload
//! retried on the next call. History and favorites files containing
//! duplicate entries for one book are normalized in memory and rewritten
//! immediately.
//!
//! Everything is single-threaded, synchronous and blocking; records are
//! shared via `Rc` and refreshed behind `RefCell`. Writes replace whole
//! files without a rename step. Both are deliberate scope decisions.
//!
//! ## Example
//!
//! ```no_run
//! use koshelf::Library;
//!
//! # fn main() -> koshelf::Result<()> {
//! let mut library = Library::open("/storage/emulated/0/koreader")?;
//! library.add_to_history("/storage/emulated/0/books/novel.epub")?;
//! for book in library.history() {
//!     println!("{} ({:?})", book.file_path().display(), book.title());
//! }
//! # Ok(())
//! # }
//! ```

pub mod book;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod library;
mod list;
pub mod lua;
pub mod paths;
pub mod value;

pub use book::BookRecord;
pub use cache::{CachedTable, RefreshOutcome};
pub use config::KoshelfConfig;
pub use error::{KoshelfError, Result};
pub use format::BookFormat;
pub use library::Library;
pub use paths::Storage;
pub use value::{Table, TableExt, Value};
