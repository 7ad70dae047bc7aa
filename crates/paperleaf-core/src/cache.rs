//! Persistent layout cache.
//!
//! One JSON file per `(content hash, render parameters hash)` pair holds a
//! complete page table. The cache is advisory: any entry that cannot be read,
//! parsed or matched is treated as a miss and the book is paginated again.

use crate::epub_loader::BookIdentity;
use crate::pagination::PageTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const FORMAT_VERSION: u32 = 1;
/// Entries above this size are ignored rather than parsed.
const MAX_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug)]
pub enum CacheError {
    WriteFailed { path: PathBuf, source: io::Error },
    Serialize(serde_json::Error),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::WriteFailed { path, source } => {
                write!(f, "failed to write layout cache {}: {source}", path.display())
            }
            CacheError::Serialize(err) => write!(f, "failed to encode layout cache entry: {err}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::WriteFailed { source, .. } => Some(source),
            CacheError::Serialize(err) => Some(err),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    format_version: u32,
    content_hash: String,
    params_hash: String,
    created_at: u64,
    pages: PageTable,
}

#[derive(Debug, Clone)]
pub struct LayoutCache {
    dir: PathBuf,
}

impl LayoutCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, identity: &BookIdentity, params_hash: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", identity.content_hash, params_hash))
    }

    /// Cached full page table for this book and layout, if one is valid.
    pub fn get(&self, identity: &BookIdentity, params_hash: &str) -> Option<PageTable> {
        let path = self.entry_path(identity, params_hash);
        let meta = fs::metadata(&path).ok()?;
        if meta.len() > MAX_ENTRY_BYTES {
            warn!(path = %path.display(), bytes = meta.len(), "Ignoring oversized layout cache entry");
            return None;
        }
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                debug!(path = %path.display(), "Layout cache read failed: {err}");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(&data) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), "Discarding unreadable layout cache entry: {err}");
                return None;
            }
        };
        if entry.format_version != FORMAT_VERSION
            || entry.content_hash != identity.content_hash
            || entry.params_hash != params_hash
        {
            debug!(path = %path.display(), "Layout cache entry does not match request");
            return None;
        }
        info!(
            path = %path.display(),
            pages = entry.pages.len(),
            "Loaded page table from layout cache"
        );
        Some(entry.pages)
    }

    /// Persist a complete page table; readers never see a partial file.
    pub fn put(
        &self,
        identity: &BookIdentity,
        params_hash: &str,
        pages: &PageTable,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(identity, params_hash);
        let entry = CacheEntry {
            format_version: FORMAT_VERSION,
            content_hash: identity.content_hash.clone(),
            params_hash: params_hash.to_string(),
            created_at: unix_now_secs(),
            pages: pages.clone(),
        };
        let payload = serde_json::to_vec(&entry).map_err(CacheError::Serialize)?;
        write_atomically(&path, &payload).map_err(|source| CacheError::WriteFailed {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), pages = pages.len(), "Stored page table in layout cache");
        Ok(())
    }

    /// Drop the entry for this book and layout so the next open recomputes it.
    pub fn invalidate(&self, identity: &BookIdentity, params_hash: &str) {
        let path = self.entry_path(identity, params_hash);
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "Cleared layout cache entry"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), "Failed to clear layout cache entry: {err}"),
        }
    }
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = unique_temp_path(path);
    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn unique_temp_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let nonce = SEQ.fetch_add(1, Ordering::Relaxed);
    let ts_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut temp_name = path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("entry")
        .to_string();
    temp_name.push_str(&format!(".tmp-{ts_nanos}-{nonce}"));
    path.with_file_name(temp_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageSpan;

    fn unique_temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("paperleaf_test_{name}_{nanos}"))
    }

    fn identity(hash: &str) -> BookIdentity {
        BookIdentity {
            path: PathBuf::from("/books/sample.epub"),
            content_hash: hash.to_string(),
        }
    }

    fn table() -> PageTable {
        PageTable::new(vec![
            PageSpan {
                chapter: 0,
                start: 0,
                end: 120,
            },
            PageSpan {
                chapter: 0,
                start: 120,
                end: 260,
            },
            PageSpan {
                chapter: 1,
                start: 0,
                end: 90,
            },
        ])
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = unique_temp_dir("cache_roundtrip");
        let cache = LayoutCache::new(&dir);
        let book = identity("aaaa");

        cache.put(&book, "p1", &table()).expect("cache write");

        assert_eq!(cache.get(&book, "p1"), Some(table()));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn mismatched_keys_are_misses() {
        let dir = unique_temp_dir("cache_mismatch");
        let cache = LayoutCache::new(&dir);
        cache.put(&identity("aaaa"), "p1", &table()).expect("cache write");

        assert_eq!(cache.get(&identity("bbbb"), "p1"), None);
        assert_eq!(cache.get(&identity("aaaa"), "p2"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn entry_contents_are_verified_against_the_key() {
        let dir = unique_temp_dir("cache_tamper");
        let cache = LayoutCache::new(&dir);
        let book = identity("aaaa");
        cache.put(&identity("cccc"), "p1", &table()).expect("cache write");
        fs::rename(
            dir.join("cccc-p1.json"),
            dir.join("aaaa-p1.json"),
        )
        .expect("move entry");

        assert_eq!(cache.get(&book, "p1"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_entries_fail_closed() {
        let dir = unique_temp_dir("cache_corrupt");
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join("aaaa-p1.json"), b"{\"format_version\":1,").expect("write junk");
        let cache = LayoutCache::new(&dir);

        assert_eq!(cache.get(&identity("aaaa"), "p1"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let dir = unique_temp_dir("cache_invalidate");
        let cache = LayoutCache::new(&dir);
        let book = identity("aaaa");
        cache.put(&book, "p1", &table()).expect("cache write");

        cache.invalidate(&book, "p1");
        cache.invalidate(&book, "p1");

        assert_eq!(cache.get(&book, "p1"), None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_directory_reports_write_failed() {
        let dir = unique_temp_dir("cache_unwritable");
        fs::write(&dir, b"a file where the cache dir should be").expect("write blocker");
        let cache = LayoutCache::new(&dir);

        let err = cache
            .put(&identity("aaaa"), "p1", &table())
            .expect_err("parent is a file");

        assert!(matches!(err, CacheError::WriteFailed { .. }));
        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = unique_temp_dir("cache_atomic");
        let path = dir.join("entry.json");
        write_atomically(&path, b"first").expect("first write");
        write_atomically(&path, b"second").expect("second write");

        assert_eq!(fs::read(&path).expect("read back"), b"second");
        let names: Vec<String> = fs::read_dir(&dir)
            .expect("list dir")
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["entry.json".to_string()]);
        let _ = fs::remove_dir_all(&dir);
    }
}
