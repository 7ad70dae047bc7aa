mod messages;
mod state;
mod update;

pub use messages::LoopEvent;
use state::ReaderApp;

use crate::console::spawn_stdin_buttons;
use anyhow::{Context, Result, bail};
use paperleaf_core::bookmarks::BookmarkStore;
use paperleaf_core::config::AppConfig;
use paperleaf_core::library::scan_books;
use paperleaf_core::navigation::{Effect, Navigator};
use paperleaf_core::render::RefreshMode;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

const SHORT_HOLD: Duration = Duration::from_millis(80);

/// Scan the library, reopen the last book if there is one, and run the
/// reader until shutdown.
pub fn run_app(config: AppConfig) -> Result<()> {
    let books_dir = config.books_path();
    let books = scan_books(&books_dir)
        .with_context(|| format!("Failed to read books directory {}", books_dir.display()))?;
    info!(dir = %books_dir.display(), count = books.len(), "Scanned library");

    let last_book = BookmarkStore::new(config.state_path())
        .load_last_book()
        .map(|last| last.path)
        .filter(|path| path.is_file());
    if books.is_empty() && last_book.is_none() {
        bail!("No books found in {}", books_dir.display());
    }

    let (tx, rx) = mpsc::channel();
    let signal_tx = tx.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = signal_tx.send(LoopEvent::Shutdown);
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }
    let long_hold = Duration::from_millis(config.long_press_ms) + Duration::from_millis(100);
    spawn_stdin_buttons(tx.clone(), SHORT_HOLD, long_hold);

    let initial = match &last_book {
        Some(path) => {
            info!(path = %path.display(), "Reopening last book");
            vec![Effect::OpenBook(path.clone())]
        }
        None => vec![Effect::Render(RefreshMode::Full)],
    };
    let navigator = Navigator::new(books, false);
    let mut app = ReaderApp::new(config, navigator, tx, rx);
    app.run(initial)
}
