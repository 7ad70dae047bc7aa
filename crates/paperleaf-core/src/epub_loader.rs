//! EPUB loading utilities.
//!
//! Opens an EPUB, walks its spine, strips markup and returns one cleaned
//! plain-text block per spine document together with a hash of the file
//! bytes. Everything downstream (pagination, layout cache, bookmarks) keys
//! off that hash.

use crate::text_utils::{clean_text, heading_candidate};
use epub::doc::{EpubDoc, NavPoint};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Which file a book came from and what its bytes hashed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookIdentity {
    pub path: PathBuf,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub index: usize,
    pub title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedBook {
    pub identity: BookIdentity,
    pub title: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat { path: PathBuf },
    MalformedContainer { path: PathBuf, reason: String },
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::UnsupportedFormat { path } => {
                write!(f, "{} is not an EPUB file", path.display())
            }
            ExtractError::MalformedContainer { path, reason } => {
                write!(f, "{} is a damaged EPUB: {reason}", path.display())
            }
            ExtractError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Producer of ordered chapter text for a book file.
pub trait ChapterSource: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedBook, ExtractError>;
}

/// [`ChapterSource`] backed by the `epub` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubExtractor;

impl ChapterSource for EpubExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedBook, ExtractError> {
        load_epub(path)
    }
}

/// Lowercase hex SHA-256 of a book's bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn is_epub(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase()),
        Some(ext) if ext == "epub"
    )
}

/// Load an EPUB from disk as cleaned per-chapter text.
pub fn load_epub(path: &Path) -> Result<ExtractedBook, ExtractError> {
    if !is_epub(path) {
        return Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), bytes = bytes.len(), "Loading EPUB content");
    let identity = BookIdentity {
        path: path.to_path_buf(),
        content_hash: content_hash(&bytes),
    };
    let mut doc =
        EpubDoc::from_reader(Cursor::new(bytes)).map_err(|err| ExtractError::MalformedContainer {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let mut toc_titles = HashMap::new();
    collect_toc_titles(&doc, &doc.toc, &mut toc_titles);

    let spine: Vec<(usize, String)> = doc
        .spine
        .iter()
        .enumerate()
        .map(|(idx, item)| (idx, item.idref.clone()))
        .collect();

    let mut chapters = Vec::new();
    for (spine_idx, idref) in spine {
        if is_navigation_document(&doc, &idref) {
            continue;
        }
        if !doc.set_current_chapter(spine_idx) {
            warn!(spine_idx, "Spine item could not be selected");
            continue;
        }
        let Some((markup, _mime)) = doc.get_current_str() else {
            warn!(spine_idx, %idref, "Spine item has no readable content");
            continue;
        };
        let plain = match html2text::from_read(markup.as_bytes(), 10_000) {
            Ok(clean) => clean,
            Err(err) => {
                warn!(spine_idx, "html2text failed: {err}");
                markup
            }
        };
        let text = clean_text(&plain);
        let index = chapters.len();
        let title = toc_titles
            .get(&spine_idx)
            .cloned()
            .or_else(|| heading_candidate(&text));
        debug!(chapter = index, chars = text.len(), "Parsed chapter");
        chapters.push(Chapter { index, title, text });
    }

    if chapters.is_empty() {
        return Err(ExtractError::MalformedContainer {
            path: path.to_path_buf(),
            reason: "spine lists no readable documents".to_string(),
        });
    }

    let title = doc
        .mdata("title")
        .map(|item| item.value.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| file_stem(path));

    info!(
        chapters = chapters.len(),
        total_chars = chapters.iter().map(|c| c.text.len()).sum::<usize>(),
        "Finished loading EPUB content"
    );
    Ok(ExtractedBook {
        identity,
        title,
        chapters,
    })
}

/// Title metadata of a book, without extracting any chapter text.
pub fn read_title(path: &Path) -> Option<String> {
    let doc = EpubDoc::new(path).ok()?;
    doc.mdata("title")
        .map(|item| item.value.trim().to_string())
        .filter(|title| !title.is_empty())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("book")
        .to_string()
}

fn is_navigation_document<R: io::Read + io::Seek>(doc: &EpubDoc<R>, idref: &str) -> bool {
    let Some(resource) = doc.resources.get(idref) else {
        return false;
    };
    if resource.mime == "application/x-dtbncx+xml" {
        return true;
    }
    resource
        .properties
        .as_deref()
        .is_some_and(|props| props.split_whitespace().any(|p| p == "nav"))
}

fn collect_toc_titles<R: io::Read + io::Seek>(
    doc: &EpubDoc<R>,
    navpoints: &[NavPoint],
    titles: &mut HashMap<usize, String>,
) {
    for navpoint in navpoints {
        let target = navpoint.content.to_string_lossy();
        let resource = target.split('#').next().unwrap_or_default();
        if let Some(spine_idx) = doc.resource_uri_to_chapter(&PathBuf::from(resource)) {
            let label = navpoint.label.trim();
            if !label.is_empty() {
                titles.entry(spine_idx).or_insert_with(|| label.to_string());
            }
        }
        collect_toc_titles(doc, &navpoint.children, titles);
    }
}
