//! Bookmarks and the last-opened-book record.
//!
//! Each book gets a small TOML file named after a hash of its path, so odd
//! characters in file names never reach the filesystem. `last_book.toml`
//! remembers which book to reopen at startup.

use crate::cache::{unix_now_secs, write_atomically};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LAST_BOOK_FILE: &str = "last_book.toml";

/// Saved reading position for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub path: PathBuf,
    pub content_hash: String,
    pub page_index: usize,
    pub chapter: usize,
    pub offset: usize,
    #[serde(default)]
    pub saved_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastBook {
    pub path: PathBuf,
    #[serde(default)]
    pub opened_at: u64,
}

#[derive(Debug)]
pub enum StorageError {
    Io { path: PathBuf, source: io::Error },
    Encode(toml::ser::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "storage error at {}: {source}", path.display())
            }
            StorageError::Encode(err) => write!(f, "failed to encode record: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Encode(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookmarkStore {
    dir: PathBuf,
}

impl BookmarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bookmark_path(&self, book_path: &Path) -> PathBuf {
        self.dir.join(format!("{}.toml", path_hash(book_path)))
    }

    /// Saved position for `book_path`, if one exists and parses.
    pub fn load(&self, book_path: &Path) -> Option<Bookmark> {
        let path = self.bookmark_path(book_path);
        let bookmark: Bookmark = read_toml(&path)?;
        if bookmark.path != book_path {
            debug!(path = %path.display(), "Bookmark belongs to another book");
            return None;
        }
        Some(bookmark)
    }

    pub fn save(&self, bookmark: &Bookmark) -> Result<(), StorageError> {
        let mut record = bookmark.clone();
        record.saved_at = unix_now_secs();
        write_toml(&self.bookmark_path(&bookmark.path), &record)
    }

    pub fn load_last_book(&self) -> Option<LastBook> {
        read_toml(&self.dir.join(LAST_BOOK_FILE))
    }

    pub fn save_last_book(&self, book_path: &Path) -> Result<(), StorageError> {
        let record = LastBook {
            path: book_path.to_path_buf(),
            opened_at: unix_now_secs(),
        };
        write_toml(&self.dir.join(LAST_BOOK_FILE), &record)
    }
}

/// Lowercase hex SHA-256 of a path's string form.
pub fn path_hash(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_os_str().to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let data = fs::read_to_string(path).ok()?;
    match toml::from_str(&data) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), "Ignoring unreadable record: {err}");
            None
        }
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let contents = toml::to_string(value).map_err(StorageError::Encode)?;
    write_atomically(path, contents.as_bytes()).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}
