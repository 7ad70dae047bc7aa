//! UI mode handling for the four-button reader.
//!
//! [`Navigator::handle`] takes one debounced button event, applies any
//! session change directly, and returns the [`Effect`]s the loop must carry
//! out (rendering, persistence, opening books, power state). Every mode
//! handles every event; anything without a meaning is ignored.

use crate::input::{Button, ButtonEvent, EventKind};
use crate::library::LibraryEntry;
use crate::render::{RefreshMode, Screen};
use crate::session::BookSession;
use std::path::PathBuf;
use tracing::{debug, info};

/// Pages moved by a long press while reading.
pub const LONG_PRESS_PAGES: i32 = 10;
/// Page moves larger than this get a full refresh.
pub const FULL_REFRESH_JUMP: usize = 3;

const JUMP_DELTAS: [i32; 8] = [5, 10, 50, 100, -5, -10, -50, -100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Reading,
    Menu,
    BookBrowser,
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Resume,
    JumpPages(i32),
    GoToPage,
    SkipToChapter,
    RefreshBook,
    SelectBook,
    Sleep,
    Shutdown,
}

impl MenuAction {
    fn needs_book(self) -> bool {
        !matches!(
            self,
            MenuAction::SelectBook | MenuAction::Sleep | MenuAction::Shutdown
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MainItem {
    Action(MenuAction),
    JumpList,
}

const MAIN_MENU: [(MainItem, &str); 8] = [
    (MainItem::Action(MenuAction::Resume), "Resume"),
    (MainItem::JumpList, "Jump Pages"),
    (MainItem::Action(MenuAction::GoToPage), "Go To Page"),
    (MainItem::Action(MenuAction::SkipToChapter), "Skip to Chapter"),
    (MainItem::Action(MenuAction::RefreshBook), "Refresh Book"),
    (MainItem::Action(MenuAction::SelectBook), "Select Book"),
    (MainItem::Action(MenuAction::Sleep), "Sleep"),
    (MainItem::Action(MenuAction::Shutdown), "Shutdown"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuScreen {
    Main,
    Jump,
    GoToPage { target: usize },
    Chapters,
    /// Asks before a sleep or shutdown; item 0 confirms, item 1 cancels.
    Confirm(MenuAction),
}

fn confirm_labels(action: MenuAction) -> (&'static str, &'static str) {
    match action {
        MenuAction::Shutdown => ("Shutdown?", "Shutdown Now"),
        _ => ("Sleep?", "Sleep Now"),
    }
}

/// Work the input loop carries out after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Render(RefreshMode),
    SaveBookmark,
    OpenBook(PathBuf),
    RefreshBook,
    Sleep,
    Wake,
    Shutdown,
}

#[derive(Debug, Clone)]
struct MenuState {
    screen: MenuScreen,
    cursor: usize,
    main_cursor: usize,
    return_mode: UiMode,
}

impl MenuState {
    fn closed() -> Self {
        Self {
            screen: MenuScreen::Main,
            cursor: 0,
            main_cursor: 0,
            return_mode: UiMode::Reading,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Navigator {
    mode: UiMode,
    menu: MenuState,
    books: Vec<LibraryEntry>,
    browser_cursor: usize,
    notice: Option<String>,
    exit_requested: bool,
}

fn refresh_for_move(before: usize, after: usize) -> RefreshMode {
    if before.abs_diff(after) > FULL_REFRESH_JUMP {
        RefreshMode::Full
    } else {
        RefreshMode::Partial
    }
}

fn wrap(cursor: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward {
        (cursor + 1) % len
    } else {
        (cursor + len - 1) % len
    }
}

/// Apply a page move and report what the loop should do about it.
fn page_effects(session: &mut BookSession, apply: impl FnOnce(&mut BookSession) -> bool) -> Vec<Effect> {
    let before = session.current_page();
    if !apply(session) {
        return Vec::new();
    }
    vec![
        Effect::SaveBookmark,
        Effect::Render(refresh_for_move(before, session.current_page())),
    ]
}

impl Navigator {
    pub fn new(books: Vec<LibraryEntry>, book_open: bool) -> Self {
        Self {
            mode: if book_open {
                UiMode::Reading
            } else {
                UiMode::BookBrowser
            },
            menu: MenuState::closed(),
            books,
            browser_cursor: 0,
            notice: None,
            exit_requested: false,
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn menu_screen(&self) -> Option<MenuScreen> {
        (self.mode == UiMode::Menu).then_some(self.menu.screen)
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn books(&self) -> &[LibraryEntry] {
        &self.books
    }

    pub fn set_books(&mut self, books: Vec<LibraryEntry>) {
        self.books = books;
        self.browser_cursor = self.browser_cursor.min(self.books.len().saturating_sub(1));
    }

    /// Enter reading after the loop opened a book.
    pub fn book_opened(&mut self) -> Vec<Effect> {
        self.mode = UiMode::Reading;
        self.notice = None;
        vec![Effect::Render(RefreshMode::Full)]
    }

    /// Stay in the browser with `message` after a failed open.
    pub fn open_failed(&mut self, message: impl Into<String>) -> Vec<Effect> {
        self.mode = UiMode::BookBrowser;
        self.notice = Some(message.into());
        vec![Effect::Render(RefreshMode::Partial)]
    }

    /// The session's page table changed under the reader.
    pub fn table_replaced(&self) -> Vec<Effect> {
        match self.mode {
            UiMode::Reading => vec![Effect::Render(RefreshMode::Full)],
            _ => Vec::new(),
        }
    }

    pub fn request_shutdown(&mut self) -> Vec<Effect> {
        if self.exit_requested {
            return Vec::new();
        }
        self.exit_requested = true;
        vec![Effect::SaveBookmark, Effect::Shutdown]
    }

    pub fn handle(&mut self, event: ButtonEvent, session: Option<&mut BookSession>) -> Vec<Effect> {
        if self.exit_requested || event.kind == EventKind::Release {
            return Vec::new();
        }
        let before = self.mode;
        let effects = match self.mode {
            UiMode::Reading => self.handle_reading(event, session),
            UiMode::Menu => self.handle_menu(event, session),
            UiMode::BookBrowser => self.handle_browser(event, session),
            UiMode::Sleep => self.wake(session.is_some()),
        };
        if before != self.mode {
            info!(from = ?before, to = ?self.mode, "UI mode changed");
        }
        debug!(?event, ?effects, "Handled button event");
        effects
    }

    fn handle_reading(&mut self, event: ButtonEvent, session: Option<&mut BookSession>) -> Vec<Effect> {
        let long = event.kind == EventKind::LongPress;
        match event.button {
            Button::Menu => self.open_menu(UiMode::Reading),
            Button::Back => Vec::new(),
            Button::Prev | Button::Next => {
                let Some(session) = session else {
                    return Vec::new();
                };
                let step = if long { LONG_PRESS_PAGES } else { 1 };
                let delta = if event.button == Button::Prev { -step } else { step };
                page_effects(session, |s| s.turn(delta))
            }
        }
    }

    fn open_menu(&mut self, return_mode: UiMode) -> Vec<Effect> {
        self.mode = UiMode::Menu;
        self.menu = MenuState {
            return_mode,
            ..MenuState::closed()
        };
        vec![Effect::Render(RefreshMode::Partial)]
    }

    fn close_menu(&mut self, book_open: bool) -> Vec<Effect> {
        self.mode = match self.menu.return_mode {
            UiMode::Reading if !book_open => UiMode::BookBrowser,
            mode => mode,
        };
        self.menu = MenuState::closed();
        vec![Effect::Render(RefreshMode::Partial)]
    }

    fn menu_len(&self, session: Option<&BookSession>) -> usize {
        match self.menu.screen {
            MenuScreen::Main => MAIN_MENU.len(),
            MenuScreen::Jump => JUMP_DELTAS.len(),
            MenuScreen::GoToPage { .. } => 1,
            MenuScreen::Chapters => session.map(|s| s.chapter_titles().len()).unwrap_or(0),
            MenuScreen::Confirm(_) => 2,
        }
    }

    fn handle_menu(&mut self, event: ButtonEvent, session: Option<&mut BookSession>) -> Vec<Effect> {
        match event.button {
            Button::Back => self.menu_back(session.is_some()),
            Button::Prev | Button::Next => {
                let forward = event.button == Button::Next;
                if let MenuScreen::GoToPage { target } = self.menu.screen {
                    let total = session.as_deref().map(BookSession::page_count).unwrap_or(0);
                    let step = if event.kind == EventKind::LongPress {
                        LONG_PRESS_PAGES as usize
                    } else {
                        1
                    };
                    let moved = if forward {
                        target.saturating_add(step).min(total.saturating_sub(1))
                    } else {
                        target.saturating_sub(step)
                    };
                    if moved == target {
                        return Vec::new();
                    }
                    self.menu.screen = MenuScreen::GoToPage { target: moved };
                } else {
                    let len = self.menu_len(session.as_deref());
                    self.menu.cursor = wrap(self.menu.cursor, len, forward);
                }
                vec![Effect::Render(RefreshMode::Partial)]
            }
            Button::Menu => self.menu_select(session),
        }
    }

    fn menu_back(&mut self, book_open: bool) -> Vec<Effect> {
        match self.menu.screen {
            MenuScreen::Main => self.close_menu(book_open),
            _ => {
                self.menu.screen = MenuScreen::Main;
                self.menu.cursor = self.menu.main_cursor;
                vec![Effect::Render(RefreshMode::Partial)]
            }
        }
    }

    fn menu_select(&mut self, session: Option<&mut BookSession>) -> Vec<Effect> {
        match self.menu.screen {
            MenuScreen::Main => {
                let Some((item, _)) = MAIN_MENU.get(self.menu.cursor).copied() else {
                    return Vec::new();
                };
                self.menu.main_cursor = self.menu.cursor;
                match item {
                    MainItem::JumpList if session.is_some() => {
                        self.menu.screen = MenuScreen::Jump;
                        self.menu.cursor = 0;
                        vec![Effect::Render(RefreshMode::Partial)]
                    }
                    MainItem::JumpList => Vec::new(),
                    MainItem::Action(action @ (MenuAction::Sleep | MenuAction::Shutdown)) => {
                        self.menu.screen = MenuScreen::Confirm(action);
                        self.menu.cursor = 0;
                        vec![Effect::Render(RefreshMode::Partial)]
                    }
                    MainItem::Action(action) => self.apply(action, session),
                }
            }
            MenuScreen::Jump => {
                let delta = JUMP_DELTAS[self.menu.cursor % JUMP_DELTAS.len()];
                self.apply(MenuAction::JumpPages(delta), session)
            }
            MenuScreen::GoToPage { target } => {
                let Some(session) = session else {
                    return Vec::new();
                };
                self.finish_menu(session, |s| s.jump_to_page(target))
            }
            MenuScreen::Chapters => {
                let Some(session) = session else {
                    return Vec::new();
                };
                let chapter = self.menu.cursor;
                self.finish_menu(session, |s| s.jump_to_chapter(chapter))
            }
            MenuScreen::Confirm(action) if self.menu.cursor == 0 => self.apply(action, session),
            MenuScreen::Confirm(_) => self.menu_back(session.is_some()),
        }
    }

    /// Leave the menu for reading after a page move.
    fn finish_menu(
        &mut self,
        session: &mut BookSession,
        apply: impl FnOnce(&mut BookSession) -> bool,
    ) -> Vec<Effect> {
        self.mode = UiMode::Reading;
        self.menu = MenuState::closed();
        let effects = page_effects(session, apply);
        if effects.is_empty() {
            vec![Effect::Render(RefreshMode::Partial)]
        } else {
            effects
        }
    }

    /// Run one menu action.
    pub fn apply(&mut self, action: MenuAction, session: Option<&mut BookSession>) -> Vec<Effect> {
        if action.needs_book() && session.is_none() {
            debug!(?action, "Menu action needs an open book");
            return Vec::new();
        }
        info!(?action, "Menu action");
        match (action, session) {
            (MenuAction::Resume, _) => {
                self.mode = UiMode::Reading;
                self.menu = MenuState::closed();
                vec![Effect::Render(RefreshMode::Partial)]
            }
            (MenuAction::JumpPages(delta), Some(session)) => {
                self.finish_menu(session, |s| s.turn(delta))
            }
            (MenuAction::GoToPage, Some(session)) => {
                self.mode = UiMode::Menu;
                self.menu.screen = MenuScreen::GoToPage {
                    target: session.current_page(),
                };
                self.menu.cursor = 0;
                vec![Effect::Render(RefreshMode::Partial)]
            }
            (MenuAction::SkipToChapter, Some(session)) => {
                self.mode = UiMode::Menu;
                self.menu.screen = MenuScreen::Chapters;
                self.menu.cursor = session.current_chapter().unwrap_or(0);
                vec![Effect::Render(RefreshMode::Partial)]
            }
            (MenuAction::RefreshBook, Some(_)) => {
                self.mode = UiMode::Reading;
                self.menu = MenuState::closed();
                vec![Effect::RefreshBook]
            }
            (MenuAction::SelectBook, session) => {
                self.mode = UiMode::BookBrowser;
                self.menu = MenuState::closed();
                self.notice = None;
                if let Some(session) = session {
                    let open_path = &session.identity().path;
                    if let Some(idx) = self.books.iter().position(|b| &b.path == open_path) {
                        self.browser_cursor = idx;
                    }
                }
                vec![Effect::Render(RefreshMode::Partial)]
            }
            (MenuAction::Sleep, _) => {
                self.mode = UiMode::Sleep;
                self.menu = MenuState::closed();
                vec![
                    Effect::SaveBookmark,
                    Effect::Render(RefreshMode::Full),
                    Effect::Sleep,
                ]
            }
            (MenuAction::Shutdown, _) => {
                self.menu = MenuState::closed();
                self.request_shutdown()
            }
            (_, None) => Vec::new(),
        }
    }

    fn handle_browser(&mut self, event: ButtonEvent, session: Option<&mut BookSession>) -> Vec<Effect> {
        match event.button {
            Button::Prev | Button::Next => {
                if self.books.is_empty() {
                    return Vec::new();
                }
                self.browser_cursor =
                    wrap(self.browser_cursor, self.books.len(), event.button == Button::Next);
                self.notice = None;
                vec![Effect::Render(RefreshMode::Partial)]
            }
            Button::Menu => match self.books.get(self.browser_cursor) {
                Some(entry) => vec![Effect::OpenBook(entry.path.clone())],
                None => Vec::new(),
            },
            Button::Back if session.is_some() => {
                let effects = self.open_menu(UiMode::Reading);
                self.notice = None;
                effects
            }
            Button::Back => Vec::new(),
        }
    }

    fn wake(&mut self, book_open: bool) -> Vec<Effect> {
        self.mode = if book_open {
            UiMode::Reading
        } else {
            UiMode::BookBrowser
        };
        vec![Effect::Wake, Effect::Render(RefreshMode::Full)]
    }

    /// Describe what the panel should show right now.
    pub fn frame(&self, session: Option<&BookSession>) -> Screen {
        match (self.mode, session) {
            (UiMode::Sleep, _) => Screen::Sleep,
            (UiMode::Reading, Some(session)) => reading_screen(session),
            (UiMode::Reading, None) => Screen::Notice {
                message: "No book open".to_string(),
            },
            (UiMode::Menu, session) => self.menu_screen_frame(session),
            (UiMode::BookBrowser, _) => Screen::Browser {
                items: self.books.iter().map(|book| book.title.clone()).collect(),
                selected: self.browser_cursor,
                notice: self.notice.clone().or_else(|| {
                    self.books
                        .is_empty()
                        .then(|| "No books found".to_string())
                }),
            },
        }
    }

    fn menu_screen_frame(&self, session: Option<&BookSession>) -> Screen {
        let (title, items) = match self.menu.screen {
            MenuScreen::Main => (
                "Menu".to_string(),
                MAIN_MENU.iter().map(|(_, label)| label.to_string()).collect(),
            ),
            MenuScreen::Jump => (
                "Jump Pages".to_string(),
                JUMP_DELTAS.iter().map(|delta| format!("{delta:+}")).collect(),
            ),
            MenuScreen::GoToPage { target } => {
                let total = session.map(BookSession::page_count).unwrap_or(0);
                (
                    "Go To Page".to_string(),
                    vec![format!("Page {} of {}", target + 1, total)],
                )
            }
            MenuScreen::Chapters => (
                "Skip to Chapter".to_string(),
                session.map(BookSession::chapter_titles).unwrap_or_default(),
            ),
            MenuScreen::Confirm(action) => {
                let (title, confirm) = confirm_labels(action);
                (
                    title.to_string(),
                    vec![confirm.to_string(), "Cancel".to_string()],
                )
            }
        };
        Screen::Menu {
            title,
            items,
            selected: self.menu.cursor,
        }
    }
}

fn reading_screen(session: &BookSession) -> Screen {
    let progress = session.progress();
    let marker = if progress.partial { "+" } else { "" };
    Screen::Reading {
        title: session.title().to_string(),
        lines: session.current_page_lines(),
        footer: format!("{} / {}{marker}", progress.page, progress.total),
    }
}
