use super::messages::LoopEvent;
use super::state::ReaderApp;
use anyhow::Result;
use paperleaf_core::background::PaginationOutcome;
use paperleaf_core::input::ButtonEvent;
use paperleaf_core::library::scan_books;
use paperleaf_core::navigation::{Effect, UiMode};
use paperleaf_core::render::RefreshMode;
use paperleaf_core::session::{BookSession, lock_session};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const IDLE_TICK: Duration = Duration::from_secs(1);

impl ReaderApp {
    /// Run until shutdown is requested, executing `initial` effects first.
    pub fn run(&mut self, initial: Vec<Effect>) -> Result<()> {
        self.execute(initial);
        while self.running {
            let timeout = self.next_timeout(Instant::now());
            match self.rx.recv_timeout(timeout) {
                Ok(event) => self.on_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Event channel closed; shutting down");
                    let effects = self.navigator.request_shutdown();
                    self.execute(effects);
                }
            }
            let now = Instant::now();
            let events = self.debouncer.poll(now);
            self.dispatch_buttons(events);
            self.autosave(now);
        }
        self.background.shutdown();
        self.save_bookmark(true);
        info!("Reader stopped");
        Ok(())
    }

    fn next_timeout(&self, now: Instant) -> Duration {
        let autosave_due = self.last_autosave + self.config.autosave_interval();
        let mut timeout = IDLE_TICK.min(autosave_due.saturating_duration_since(now));
        if let Some(deadline) = self.debouncer.next_deadline() {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }
        timeout.max(Duration::from_millis(1))
    }

    fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Edge(edge) => {
                let events = self.debouncer.feed(edge);
                self.dispatch_buttons(events);
            }
            LoopEvent::Pagination(outcome) => {
                debug!(?outcome, "Pagination finished");
                if let PaginationOutcome::Published { pages, .. } = outcome {
                    info!(pages, "Full page table in place");
                    let effects = self.navigator.table_replaced();
                    self.execute(effects);
                }
            }
            LoopEvent::Shutdown => {
                info!("Shutdown requested");
                let effects = self.navigator.request_shutdown();
                self.execute(effects);
            }
            LoopEvent::InputClosed => {
                info!("Button input closed");
                let effects = self.navigator.request_shutdown();
                self.execute(effects);
            }
        }
    }

    fn dispatch_buttons(&mut self, events: Vec<ButtonEvent>) {
        for event in events {
            debug!(button = ?event.button, kind = ?event.kind, "Button event");
            let before = self.navigator.mode();
            let effects = {
                let mut guard = lock_session(&self.session);
                self.navigator.handle(event, guard.as_mut())
            };
            if before != UiMode::BookBrowser && self.navigator.mode() == UiMode::BookBrowser {
                self.rescan_library();
            }
            self.execute(effects);
        }
    }

    fn rescan_library(&mut self) {
        match scan_books(&self.config.books_path()) {
            Ok(books) => {
                debug!(count = books.len(), "Rescanned library");
                self.navigator.set_books(books);
            }
            Err(err) => warn!("Keeping previous book list: {err}"),
        }
    }

    /// Carry out effects in order. Effects produced along the way run after
    /// the ones already queued.
    fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Render(mode) => self.render(mode),
                Effect::SaveBookmark => self.save_bookmark(false),
                Effect::OpenBook(path) => queue.extend(self.open_book(&path)),
                Effect::RefreshBook => queue.extend(self.refresh_book()),
                Effect::Sleep => {
                    info!("Display sleeping");
                    self.dispatcher.sleep();
                }
                Effect::Wake => {
                    info!("Display waking");
                    self.dispatcher.wake();
                }
                Effect::Shutdown => {
                    info!("Shutting down reader");
                    self.running = false;
                }
            }
        }
    }

    fn render(&mut self, mode: RefreshMode) {
        let screen = {
            let guard = lock_session(&self.session);
            self.navigator.frame(guard.as_ref())
        };
        if let Err(err) = self.dispatcher.present(&screen, mode) {
            error!("Failed to update display: {err}");
        }
    }

    /// Persist the open book's position. Unless `force`, clean bookmarks are
    /// skipped.
    fn save_bookmark(&mut self, force: bool) {
        let mut guard = lock_session(&self.session);
        let Some(session) = guard.as_mut() else {
            return;
        };
        if !force && !session.bookmark_dirty() {
            return;
        }
        let bookmark = session.bookmark();
        match self.bookmarks.save(&bookmark) {
            Ok(()) => {
                session.mark_bookmark_saved();
                debug!(page = bookmark.page_index, "Saved bookmark");
            }
            Err(err) => warn!("Failed to save bookmark: {err}"),
        }
    }

    fn autosave(&mut self, now: Instant) {
        if now.duration_since(self.last_autosave) < self.config.autosave_interval() {
            return;
        }
        self.last_autosave = now;
        self.save_bookmark(false);
    }

    /// Open `path` in place of the current book. A book that fails to open
    /// leaves the current one and its background run untouched.
    fn open_book(&mut self, path: &Path) -> Vec<Effect> {
        self.save_bookmark(true);
        match self.swap_session(path) {
            Ok(()) => self.navigator.book_opened(),
            Err(message) => self.navigator.open_failed(message),
        }
    }

    /// Drop the cached layout of the open book and load it again.
    fn refresh_book(&mut self) -> Vec<Effect> {
        let current = {
            let guard = lock_session(&self.session);
            guard
                .as_ref()
                .map(|session| (session.identity().clone(), session.params_hash().to_string()))
        };
        let Some((identity, params_hash)) = current else {
            return Vec::new();
        };
        info!(path = %identity.path.display(), "Refreshing book");
        self.save_bookmark(true);
        self.cache.invalidate(&identity, &params_hash);
        match self.swap_session(&identity.path) {
            Ok(()) => vec![Effect::Render(RefreshMode::Full)],
            Err(message) => self.navigator.open_failed(message),
        }
    }

    /// Open `path` without holding the session lock. Only once it opened is
    /// the previous run cancelled and the new session installed, with
    /// background pagination when the layout is incomplete.
    fn swap_session(&mut self, path: &Path) -> Result<(), String> {
        let started = Instant::now();
        let opened = BookSession::open(path, &self.open_context());
        let (session, job) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                warn!(path = %path.display(), "Failed to open book: {err}");
                return Err(format!("Could not open {}: {err}", display_name(path)));
            }
        };
        info!(
            path = %path.display(),
            title = %session.title(),
            pages = session.page_count(),
            partial = session.is_partial(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Opened book"
        );
        if let Err(err) = self.bookmarks.save_last_book(path) {
            warn!("Failed to remember last book: {err}");
        }
        self.background.cancel();
        *lock_session(&self.session) = Some(session);
        if let Some(job) = job {
            let tx = self.tx.clone();
            self.background.start(
                job,
                self.session.clone(),
                self.cache.clone(),
                move |outcome| {
                    let _ = tx.send(LoopEvent::Pagination(outcome));
                },
            );
        }
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperleaf_core::config::AppConfig;
    use paperleaf_core::epub_loader::{
        BookIdentity, Chapter, ChapterSource, ExtractError, ExtractedBook,
    };
    use paperleaf_core::navigation::Navigator;
    use paperleaf_core::render::Screen;
    use std::collections::HashMap;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Serves books from memory; paths it doesn't know are damaged files.
    #[derive(Clone, Default)]
    struct MemoryShelf {
        books: Arc<Mutex<HashMap<PathBuf, Vec<String>>>>,
        extractions: Arc<AtomicUsize>,
    }

    impl MemoryShelf {
        fn add(&self, path: &Path, chapters: Vec<String>) {
            self.books
                .lock()
                .expect("shelf lock")
                .insert(path.to_path_buf(), chapters);
        }

        fn remove(&self, path: &Path) {
            self.books.lock().expect("shelf lock").remove(path);
        }
    }

    impl ChapterSource for MemoryShelf {
        fn extract(&self, path: &Path) -> Result<ExtractedBook, ExtractError> {
            self.extractions.fetch_add(1, Ordering::SeqCst);
            let books = self.books.lock().expect("shelf lock");
            let Some(chapters) = books.get(path) else {
                return Err(ExtractError::MalformedContainer {
                    path: path.to_path_buf(),
                    reason: "central directory missing".to_string(),
                });
            };
            Ok(ExtractedBook {
                identity: BookIdentity {
                    path: path.to_path_buf(),
                    content_hash: format!("mem-{}", chapters.len()),
                },
                title: display_name(path),
                chapters: chapters
                    .iter()
                    .enumerate()
                    .map(|(index, text)| Chapter {
                        index,
                        title: None,
                        text: text.clone(),
                    })
                    .collect(),
            })
        }
    }

    fn chapter(lines: usize) -> String {
        (0..lines).map(|idx| format!("line{idx:05}\n")).collect()
    }

    fn temp_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("paperleaf_test_{name}_{nanos}"))
    }

    fn reader(root: &Path, shelf: &MemoryShelf) -> ReaderApp {
        let config = AppConfig {
            books_dir: root.join("books").display().to_string(),
            cache_dir: root.join("cache").display().to_string(),
            state_dir: root.join("state").display().to_string(),
            initial_pages: 2,
            ..AppConfig::default()
        };
        let (tx, rx) = mpsc::channel();
        ReaderApp::with_parts(
            config,
            Navigator::new(Vec::new(), false),
            Box::new(shelf.clone()),
            Box::new(io::sink()),
            tx,
            rx,
        )
    }

    fn next_pagination(app: &ReaderApp) -> PaginationOutcome {
        loop {
            match app.rx.recv_timeout(Duration::from_secs(10)) {
                Ok(LoopEvent::Pagination(outcome)) => return outcome,
                Ok(_) => continue,
                Err(err) => panic!("no pagination outcome: {err}"),
            }
        }
    }

    fn open_path(app: &ReaderApp) -> Option<PathBuf> {
        lock_session(&app.session)
            .as_ref()
            .map(|session| session.identity().path.clone())
    }

    #[test]
    fn damaged_book_keeps_current_book_open() {
        let root = temp_root("app_open_failure");
        let shelf = MemoryShelf::default();
        let good = root.join("books/good.epub");
        let broken = root.join("books/broken.epub");
        shelf.add(&good, vec![chapter(200), chapter(200)]);
        let mut app = reader(&root, &shelf);

        app.execute(vec![Effect::OpenBook(good.clone())]);
        assert_eq!(app.navigator.mode(), UiMode::Reading);
        assert_eq!(open_path(&app), Some(good.clone()));

        app.execute(vec![Effect::OpenBook(broken)]);
        assert_eq!(open_path(&app), Some(good.clone()));
        assert_eq!(app.navigator.mode(), UiMode::BookBrowser);
        let screen = app.navigator.frame(lock_session(&app.session).as_ref());
        match screen {
            Screen::Browser { notice, .. } => {
                assert!(notice.is_some_and(|text| text.contains("broken.epub")));
            }
            other => panic!("expected browser, got {other:?}"),
        }

        assert!(matches!(
            next_pagination(&app),
            PaginationOutcome::Published { .. }
        ));
        assert!(
            lock_session(&app.session)
                .as_ref()
                .is_some_and(|session| !session.is_partial())
        );

        app.background.shutdown();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn refresh_rebuilds_layout_and_keeps_position() {
        let root = temp_root("app_refresh");
        let shelf = MemoryShelf::default();
        let book = root.join("books/novel.epub");
        shelf.add(&book, vec![chapter(200), chapter(200)]);
        let mut app = reader(&root, &shelf);

        app.execute(vec![Effect::OpenBook(book.clone())]);
        assert!(matches!(
            next_pagination(&app),
            PaginationOutcome::Published { .. }
        ));
        let (identity, params_hash, generation) = {
            let mut guard = lock_session(&app.session);
            let session = guard.as_mut().expect("book open");
            assert!(session.jump_to_page(5));
            (
                session.identity().clone(),
                session.params_hash().to_string(),
                session.generation(),
            )
        };
        assert!(app.cache.get(&identity, &params_hash).is_some());

        app.execute(vec![Effect::RefreshBook]);
        assert_eq!(shelf.extractions.load(Ordering::SeqCst), 2);
        assert_eq!(app.navigator.mode(), UiMode::Reading);
        assert_ne!(
            lock_session(&app.session).as_ref().map(|session| session.generation()),
            Some(generation)
        );

        assert!(matches!(
            next_pagination(&app),
            PaginationOutcome::Published { .. }
        ));
        {
            let guard = lock_session(&app.session);
            let session = guard.as_ref().expect("book reopened");
            assert!(!session.is_partial());
            assert_eq!(session.current_page(), 5);
        }
        assert!(app.cache.get(&identity, &params_hash).is_some());

        app.background.shutdown();
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_refresh_keeps_the_loaded_book() {
        let root = temp_root("app_refresh_failure");
        let shelf = MemoryShelf::default();
        let book = root.join("books/gone.epub");
        shelf.add(&book, vec![chapter(20)]);
        let mut app = reader(&root, &shelf);

        app.execute(vec![Effect::OpenBook(book.clone())]);
        let _ = next_pagination(&app);
        shelf.remove(&book);

        app.execute(vec![Effect::RefreshBook]);
        assert_eq!(open_path(&app), Some(book));
        assert_eq!(app.navigator.mode(), UiMode::BookBrowser);

        app.background.shutdown();
        let _ = fs::remove_dir_all(&root);
    }
}
