//! Book directory scanning for the browser screen.

use crate::bookmarks::StorageError;
use crate::epub_loader::{file_stem, is_epub, read_title};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub title: String,
    pub modified_unix_secs: u64,
}

/// EPUB files directly inside `dir`, newest first.
///
/// Titles come from the book metadata when it can be read cheaply, otherwise
/// from the file name.
pub fn scan_books(dir: &Path) -> Result<Vec<LibraryEntry>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut books = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(ft) = entry.file_type() else {
            continue;
        };
        if ft.is_dir() || !is_epub(&path) {
            continue;
        }
        let modified_unix_secs = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);
        let title = read_title(&path).unwrap_or_else(|| file_stem(&path));
        debug!(path = %path.display(), %title, "Found book");
        books.push(LibraryEntry {
            path,
            title,
            modified_unix_secs,
        });
    }
    books.sort_by(|a, b| {
        b.modified_unix_secs
            .cmp(&a.modified_unix_secs)
            .then_with(|| a.path.cmp(&b.path))
    });
    info!(dir = %dir.display(), count = books.len(), "Scanned book directory");
    Ok(books)
}
