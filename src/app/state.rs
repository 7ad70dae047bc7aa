use super::messages::LoopEvent;
use crate::console::{ConsoleDisplay, ConsoleRenderer};
use paperleaf_core::background::BackgroundProcessor;
use paperleaf_core::bookmarks::BookmarkStore;
use paperleaf_core::cache::LayoutCache;
use paperleaf_core::config::AppConfig;
use paperleaf_core::epub_loader::{ChapterSource, EpubExtractor};
use paperleaf_core::input::Debouncer;
use paperleaf_core::navigation::Navigator;
use paperleaf_core::pagination::RenderParams;
use paperleaf_core::render::{RefreshPolicy, RenderDispatcher};
use paperleaf_core::session::{OpenContext, SharedSession};
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub(super) type ConsoleDispatcher =
    RenderDispatcher<ConsoleRenderer, ConsoleDisplay<Box<dyn Write>>>;

/// Runtime state of the reader loop.
pub struct ReaderApp {
    pub(super) config: AppConfig,
    pub(super) session: SharedSession,
    pub(super) navigator: Navigator,
    pub(super) debouncer: Debouncer,
    pub(super) background: BackgroundProcessor,
    pub(super) dispatcher: ConsoleDispatcher,
    pub(super) cache: LayoutCache,
    pub(super) bookmarks: BookmarkStore,
    pub(super) extractor: Box<dyn ChapterSource>,
    pub(super) params: RenderParams,
    pub(super) tx: Sender<LoopEvent>,
    pub(super) rx: Receiver<LoopEvent>,
    pub(super) last_autosave: Instant,
    pub(super) running: bool,
}

impl ReaderApp {
    pub fn new(
        config: AppConfig,
        navigator: Navigator,
        tx: Sender<LoopEvent>,
        rx: Receiver<LoopEvent>,
    ) -> Self {
        Self::with_parts(
            config,
            navigator,
            Box::new(EpubExtractor),
            Box::new(io::stdout()),
            tx,
            rx,
        )
    }

    pub(super) fn with_parts(
        config: AppConfig,
        navigator: Navigator,
        extractor: Box<dyn ChapterSource>,
        out: Box<dyn Write>,
        tx: Sender<LoopEvent>,
        rx: Receiver<LoopEvent>,
    ) -> Self {
        let params = config.render_params();
        let dispatcher = RenderDispatcher::new(
            ConsoleRenderer::for_params(&params),
            ConsoleDisplay::new(out),
            RefreshPolicy::new(config.full_refresh_interval),
        );
        Self {
            session: Arc::new(Mutex::new(None)),
            navigator,
            debouncer: Debouncer::new(config.debounce()),
            background: BackgroundProcessor::new(),
            dispatcher,
            cache: LayoutCache::new(config.cache_path()),
            bookmarks: BookmarkStore::new(config.state_path()),
            extractor,
            params,
            tx,
            rx,
            last_autosave: Instant::now(),
            running: true,
            config,
        }
    }

    pub(super) fn open_context(&self) -> OpenContext<'_> {
        OpenContext {
            extractor: self.extractor.as_ref(),
            cache: &self.cache,
            bookmarks: &self.bookmarks,
            params: &self.params,
            initial_pages: self.config.initial_pages,
        }
    }
}
