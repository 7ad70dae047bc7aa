//! The open book: chapters, page table, and reading position.
//!
//! A session starts with either a cached full page table or a partial one
//! covering the first pages of the book. In the partial case `open` also
//! hands back a [`PaginationJob`] for the background processor, which later
//! swaps the full table in through [`BookSession::replace_page_table`].

use crate::bookmarks::{Bookmark, BookmarkStore};
use crate::cache::LayoutCache;
use crate::epub_loader::{BookIdentity, Chapter, ChapterSource, ExtractError};
use crate::pagination::{PageSpan, PageTable, RenderParams, chapter_pages, lines_for};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Session slot shared by the input loop and the background processor.
pub type SharedSession = Arc<Mutex<Option<BookSession>>>;

pub fn lock_session(shared: &SharedSession) -> MutexGuard<'_, Option<BookSession>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Collaborators needed to open a book.
pub struct OpenContext<'a> {
    pub extractor: &'a dyn ChapterSource,
    pub cache: &'a LayoutCache,
    pub bookmarks: &'a BookmarkStore,
    pub params: &'a RenderParams,
    pub initial_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Partial,
    Full,
}

/// Full pagination still owed to a freshly opened session.
#[derive(Debug, Clone)]
pub struct PaginationJob {
    pub identity: BookIdentity,
    pub chapters: Arc<Vec<Chapter>>,
    pub params: RenderParams,
    pub params_hash: String,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub page: usize,
    pub total: usize,
    pub partial: bool,
}

#[derive(Debug)]
pub struct BookSession {
    identity: BookIdentity,
    title: String,
    chapters: Arc<Vec<Chapter>>,
    params: RenderParams,
    params_hash: String,
    table: PageTable,
    kind: TableKind,
    current_page: usize,
    bookmark_page: Option<usize>,
    generation: u64,
    pending_resume: Option<(usize, usize)>,
}

impl BookSession {
    /// Extract `path`, load or start its layout, and restore the bookmark.
    pub fn open(
        path: &Path,
        ctx: &OpenContext<'_>,
    ) -> Result<(BookSession, Option<PaginationJob>), ExtractError> {
        let book = ctx.extractor.extract(path)?;
        if book.chapters.iter().all(|chapter| chapter.text.trim().is_empty()) {
            return Err(ExtractError::MalformedContainer {
                path: path.to_path_buf(),
                reason: "book contains no text".to_string(),
            });
        }
        let params_hash = ctx.params.params_hash();
        let chapters = Arc::new(book.chapters);

        let (table, kind) = match ctx.cache.get(&book.identity, &params_hash) {
            Some(table) if !table.is_empty() => (table, TableKind::Full),
            _ => partial_table(&chapters, ctx.params, ctx.initial_pages),
        };

        let mut session = BookSession {
            identity: book.identity,
            title: book.title,
            chapters,
            params: ctx.params.clone(),
            params_hash,
            table,
            kind,
            current_page: 0,
            bookmark_page: None,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            pending_resume: None,
        };
        if let Some(mark) = ctx.bookmarks.load(path) {
            session.restore(&mark);
        }

        info!(
            path = %path.display(),
            pages = session.table.len(),
            kind = ?session.kind,
            page = session.current_page,
            "Opened book"
        );

        let job = match session.kind {
            TableKind::Partial => Some(session.pagination_job()),
            TableKind::Full => None,
        };
        Ok((session, job))
    }

    fn pagination_job(&self) -> PaginationJob {
        PaginationJob {
            identity: self.identity.clone(),
            chapters: Arc::clone(&self.chapters),
            params: self.params.clone(),
            params_hash: self.params_hash.clone(),
            generation: self.generation,
        }
    }

    fn restore(&mut self, mark: &Bookmark) {
        if mark.content_hash != self.identity.content_hash {
            info!("Book changed since the bookmark was saved; starting at the beginning");
            return;
        }
        let last = self.table.len().saturating_sub(1);
        let exact = self
            .table
            .get(mark.page_index)
            .is_some_and(|span| span.contains(mark.chapter, mark.offset));
        if exact {
            self.current_page = mark.page_index;
        } else if let Some(idx) = self.table.find(mark.chapter, mark.offset) {
            self.current_page = idx;
        } else if self.kind == TableKind::Partial {
            self.current_page = last;
            self.pending_resume = Some((mark.chapter, mark.offset));
            debug!(
                chapter = mark.chapter,
                offset = mark.offset,
                "Bookmark lies beyond the partial table; resuming after full pagination"
            );
        } else {
            self.current_page = mark.page_index.min(last);
        }
        self.bookmark_page = Some(self.current_page);
    }

    pub fn identity(&self) -> &BookIdentity {
        &self.identity
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn params_hash(&self) -> &str {
        &self.params_hash
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.table.len()
    }

    pub fn page_table(&self) -> &PageTable {
        &self.table
    }

    pub fn is_partial(&self) -> bool {
        self.kind == TableKind::Partial
    }

    pub fn has_pending_resume(&self) -> bool {
        self.pending_resume.is_some()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            page: self.current_page + 1,
            total: self.table.len(),
            partial: self.is_partial(),
        }
    }

    fn current_span(&self) -> Option<&PageSpan> {
        self.table.get(self.current_page)
    }

    pub fn current_chapter(&self) -> Option<usize> {
        self.current_span().map(|span| span.chapter)
    }

    /// Display titles for every chapter, in reading order.
    pub fn chapter_titles(&self) -> Vec<String> {
        self.chapters
            .iter()
            .map(|chapter| {
                chapter
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Chapter {}", chapter.index + 1))
            })
            .collect()
    }

    fn move_to(&mut self, target: usize) -> bool {
        if self.table.is_empty() {
            return false;
        }
        let target = target.min(self.table.len() - 1);
        if target == self.current_page {
            return false;
        }
        self.current_page = target;
        self.pending_resume = None;
        true
    }

    /// Move by `delta` pages, clamped to the table. `false` if nothing moved.
    pub fn turn(&mut self, delta: i32) -> bool {
        let target = if delta < 0 {
            self.current_page.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            self.current_page.saturating_add(delta as usize)
        };
        self.move_to(target)
    }

    pub fn jump_to_page(&mut self, page: usize) -> bool {
        self.move_to(page)
    }

    /// Move to the first page of `chapter`, or of the next chapter with text.
    pub fn jump_to_chapter(&mut self, chapter: usize) -> bool {
        if chapter >= self.chapters.len() {
            return false;
        }
        match self.table.first_page_of_chapter(chapter) {
            Some(page) => self.move_to(page),
            None => false,
        }
    }

    pub fn current_page_text(&self) -> &str {
        let Some(span) = self.current_span() else {
            return "";
        };
        self.chapters
            .get(span.chapter)
            .and_then(|chapter| chapter.text.get(span.start..span.end))
            .unwrap_or_default()
    }

    /// The current page wrapped into display lines.
    pub fn current_page_lines(&self) -> Vec<String> {
        let Some(span) = self.current_span() else {
            return Vec::new();
        };
        match self.chapters.get(span.chapter) {
            Some(chapter) => lines_for(&chapter.text, span, &self.params),
            None => Vec::new(),
        }
    }

    /// Reading position to persist. A pending resume wins over the clamped page.
    pub fn bookmark(&self) -> Bookmark {
        let (chapter, offset) = match (self.pending_resume, self.current_span()) {
            (Some(position), _) => position,
            (None, Some(span)) => (span.chapter, span.start),
            (None, None) => (0, 0),
        };
        Bookmark {
            path: self.identity.path.clone(),
            content_hash: self.identity.content_hash.clone(),
            page_index: self.current_page,
            chapter,
            offset,
            saved_at: 0,
        }
    }

    /// Whether the position moved since the bookmark was last persisted.
    pub fn bookmark_dirty(&self) -> bool {
        self.bookmark_page != Some(self.current_page)
    }

    pub fn mark_bookmark_saved(&mut self) {
        self.bookmark_page = Some(self.current_page);
    }

    /// Swap in a new page table, keeping the reader on the same text.
    pub fn replace_page_table(&mut self, table: PageTable) {
        if table.is_empty() {
            warn!("Refusing to replace page table with an empty one");
            return;
        }
        let position = self
            .pending_resume
            .take()
            .or_else(|| self.current_span().map(|span| (span.chapter, span.start)));
        let remapped = position.and_then(|(chapter, offset)| table.find(chapter, offset));
        let previous = self.current_page;
        self.current_page = remapped.unwrap_or_else(|| previous.min(table.len() - 1));
        info!(
            old_pages = self.table.len(),
            new_pages = table.len(),
            old_page = previous,
            new_page = self.current_page,
            "Replaced page table"
        );
        self.table = table;
        self.kind = TableKind::Full;
    }
}

/// First pages of the first chapter with any text.
///
/// Earlier chapters are empty, so this is always a prefix of the full table.
fn partial_table(
    chapters: &[Chapter],
    params: &RenderParams,
    initial_pages: usize,
) -> (PageTable, TableKind) {
    let limit = initial_pages.max(1);
    let Some(first) = chapters
        .iter()
        .position(|chapter| !chapter.text.trim().is_empty())
    else {
        return (PageTable::default(), TableKind::Full);
    };
    let mut pages = chapter_pages(first, &chapters[first].text, params, 0);
    let table = PageTable::new(pages.by_ref().take(limit).collect());
    let rest_empty = chapters[first + 1..]
        .iter()
        .all(|chapter| chapter.text.trim().is_empty());
    let kind = if rest_empty && pages.next().is_none() {
        TableKind::Full
    } else {
        TableKind::Partial
    };
    (table, kind)
}
