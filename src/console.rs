//! Terminal stand-ins for the panel and the buttons.
//!
//! The renderer lays a [`Screen`] out as a fixed grid of text rows and the
//! display writes it to a terminal. Buttons are read from stdin, one letter
//! per line: `p`/`n`/`m`/`b` for a short press, upper case for a hold.

use crate::app::LoopEvent;
use paperleaf_core::input::{Button, ButtonEdge};
use paperleaf_core::pagination::RenderParams;
use paperleaf_core::render::{Display, RefreshMode, RenderError, Renderer, Screen};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const CURSOR_HOME: &str = "\x1b[H";
const CLEAR_LINE: &str = "\x1b[K";

/// A rendered frame: exactly `rows` lines of at most `columns` characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    columns: usize,
    rows: usize,
}

impl ConsoleRenderer {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns: columns.max(16),
            rows: rows.max(6),
        }
    }

    /// Grid wide enough for any line the paginator can produce, with room
    /// for the title, a rule and the footer.
    pub fn for_params(params: &RenderParams) -> Self {
        Self::new(
            params.max_line_chars(),
            params.viewport.lines_per_page(&params.metrics) + 3,
        )
    }

    /// Split a page line into rows; overlong words continue on the next row.
    fn wrap(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return vec![String::new()];
        }
        chars
            .chunks(self.columns)
            .map(|chunk| chunk.iter().collect())
            .collect()
    }

    fn fit(&self, text: &str) -> String {
        text.chars().take(self.columns).collect()
    }

    fn rule(&self) -> String {
        "-".repeat(self.columns)
    }

    /// Items around `selected` that fit in `space` rows, with a cursor mark.
    fn list(&self, items: &[String], selected: usize, space: usize) -> Vec<String> {
        let space = space.max(1);
        let first = selected.saturating_sub(space / 2).min(items.len().saturating_sub(space));
        items
            .iter()
            .enumerate()
            .skip(first)
            .take(space)
            .map(|(idx, item)| {
                let marker = if idx == selected { "> " } else { "  " };
                self.fit(&format!("{marker}{item}"))
            })
            .collect()
    }

    fn finish(&self, mut body: Vec<String>, footer: Option<String>) -> TextFrame {
        let reserved = usize::from(footer.is_some());
        body.truncate(self.rows - reserved);
        body.resize(self.rows - reserved, String::new());
        if let Some(footer) = footer {
            body.push(self.fit(&footer));
        }
        TextFrame { lines: body }
    }
}

impl Renderer for ConsoleRenderer {
    type Image = TextFrame;

    fn render(&mut self, screen: &Screen) -> Result<TextFrame, RenderError> {
        let frame = match screen {
            Screen::Reading {
                title,
                lines,
                footer,
            } => {
                let mut body = vec![self.fit(title), self.rule()];
                body.extend(lines.iter().flat_map(|line| self.wrap(line)));
                self.finish(body, Some(format!("{footer:>width$}", width = self.columns)))
            }
            Screen::Menu {
                title,
                items,
                selected,
            } => {
                let mut body = vec![self.fit(title), self.rule()];
                body.extend(self.list(items, *selected, self.rows - 3));
                self.finish(body, Some("m select  b back".to_string()))
            }
            Screen::Browser {
                items,
                selected,
                notice,
            } => {
                let mut body = vec![self.fit("Library"), self.rule()];
                let space = self.rows - 3 - usize::from(notice.is_some()) * 2;
                body.extend(self.list(items, *selected, space));
                if let Some(notice) = notice {
                    body.resize(self.rows - 3, String::new());
                    body.push(self.rule());
                    body.push(self.fit(notice));
                }
                self.finish(body, Some("m open  b menu".to_string()))
            }
            Screen::Sleep => {
                let mut body = vec![String::new(); self.rows / 2 - 1];
                body.push(self.fit("Display is sleeping"));
                body.push(self.fit("Press any button to wake"));
                self.finish(body, None)
            }
            Screen::Notice { message } => {
                let mut body = vec![self.fit("Notice"), self.rule()];
                body.extend(message.lines().map(|line| self.fit(line)));
                self.finish(body, None)
            }
        };
        Ok(frame)
    }
}

/// Writes frames to a terminal, clearing it on full refreshes.
pub struct ConsoleDisplay<W: Write> {
    out: W,
    frames: u64,
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self { out, frames: 0 }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for ConsoleDisplay<W> {
    type Image = TextFrame;

    fn show(&mut self, image: &TextFrame, mode: RefreshMode) -> Result<(), RenderError> {
        let prefix = match mode {
            RefreshMode::Full => CLEAR_SCREEN,
            RefreshMode::Partial => CURSOR_HOME,
        };
        let mut buffer = String::from(prefix);
        for line in &image.lines {
            buffer.push_str(line);
            buffer.push_str(CLEAR_LINE);
            buffer.push('\n');
        }
        self.out
            .write_all(buffer.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|err| RenderError::Display(err.to_string()))?;
        self.frames += 1;
        debug!(frame = self.frames, ?mode, "Console frame written");
        Ok(())
    }

    fn sleep(&mut self) {
        info!("Console display sleeping");
    }

    fn wake(&mut self) {
        info!("Console display awake");
    }
}

fn parse_command(command: &str) -> Option<(Button, bool)> {
    let mut chars = command.trim().chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let button = match ch.to_ascii_lowercase() {
        'p' => Button::Prev,
        'n' => Button::Next,
        'm' => Button::Menu,
        'b' => Button::Back,
        _ => return None,
    };
    Some((button, ch.is_ascii_uppercase()))
}

/// Feed button edges from stdin into the loop until stdin closes.
///
/// Each command becomes a press edge followed by a release edge after a
/// short or a long hold.
pub fn spawn_stdin_buttons(tx: Sender<LoopEvent>, short_hold: Duration, long_hold: Duration) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to read button input: {err}");
                    break;
                }
            };
            let Some((button, held)) = parse_command(&line) else {
                if line.trim() == "q" {
                    let _ = tx.send(LoopEvent::Shutdown);
                } else if !line.trim().is_empty() {
                    warn!(input = %line.trim(), "Unknown button command");
                }
                continue;
            };
            let hold = if held { long_hold } else { short_hold };
            let pressed = ButtonEdge {
                button,
                pressed: true,
                at: Instant::now(),
            };
            if tx.send(LoopEvent::Edge(pressed)).is_err() {
                return;
            }
            thread::sleep(hold);
            let released = ButtonEdge {
                button,
                pressed: false,
                at: Instant::now(),
            };
            if tx.send(LoopEvent::Edge(released)).is_err() {
                return;
            }
        }
        let _ = tx.send(LoopEvent::InputClosed);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperleaf_core::config::AppConfig;
    use paperleaf_core::pagination::{lines_for, paginate_chapters};

    #[test]
    fn reading_frame_has_fixed_height_and_footer() {
        let mut renderer = ConsoleRenderer::new(20, 8);
        let frame = renderer
            .render(&Screen::Reading {
                title: "A very long book title that overflows".to_string(),
                lines: vec!["first".to_string(), "second".to_string()],
                footer: "3 / 10".to_string(),
            })
            .expect("render");

        assert_eq!(frame.lines.len(), 8);
        assert_eq!(frame.lines[0].chars().count(), 20);
        assert_eq!(frame.lines[2], "first");
        assert!(frame.lines[7].ends_with("3 / 10"));
    }

    #[test]
    fn default_grid_holds_full_page_lines() {
        let params = AppConfig::default().render_params();
        let text = "it is a little ill lit i will tell jill it is still ".repeat(40);
        let table = paginate_chapters([text.as_str()], &params);
        let span = *table.get(0).expect("first page");
        let lines = lines_for(&text, &span, &params);
        assert!(lines.iter().any(|line| line.chars().count() > 33));

        let mut renderer = ConsoleRenderer::for_params(&params);
        let frame = renderer
            .render(&Screen::Reading {
                title: "Narrow".to_string(),
                lines: lines.clone(),
                footer: "1 / 3".to_string(),
            })
            .expect("render");

        assert_eq!(frame.lines[2..2 + lines.len()], lines[..]);
        assert!(frame.lines.last().is_some_and(|footer| footer.ends_with("1 / 3")));
    }

    #[test]
    fn overlong_words_wrap_instead_of_vanishing() {
        let mut renderer = ConsoleRenderer::new(16, 8);
        let frame = renderer
            .render(&Screen::Reading {
                title: "Link".to_string(),
                lines: vec!["abcdefghijklmnopqrstuvwxyz".to_string()],
                footer: String::new(),
            })
            .expect("render");

        assert_eq!(frame.lines[2], "abcdefghijklmnop");
        assert_eq!(frame.lines[3], "qrstuvwxyz");
    }

    #[test]
    fn long_lists_scroll_to_keep_selection_visible() {
        let mut renderer = ConsoleRenderer::new(20, 8);
        let items: Vec<String> = (0..30).map(|idx| format!("Chapter {idx}")).collect();
        let frame = renderer
            .render(&Screen::Menu {
                title: "Chapters".to_string(),
                items,
                selected: 25,
            })
            .expect("render");

        assert!(frame.lines.iter().any(|line| line == "> Chapter 25"));
        assert_eq!(frame.lines.len(), 8);
    }

    #[test]
    fn browser_notice_is_shown() {
        let mut renderer = ConsoleRenderer::new(30, 10);
        let frame = renderer
            .render(&Screen::Browser {
                items: vec!["Alpha".to_string(), "Beta".to_string()],
                selected: 1,
                notice: Some("Beta is damaged".to_string()),
            })
            .expect("render");

        assert!(frame.lines.contains(&"> Beta".to_string()));
        assert!(frame.lines.contains(&"Beta is damaged".to_string()));
        assert_eq!(frame.lines.len(), 10);
    }

    #[test]
    fn full_refresh_clears_the_terminal() {
        let mut display = ConsoleDisplay::new(Vec::new());
        let frame = TextFrame {
            lines: vec!["hello".to_string()],
        };
        display.show(&frame, RefreshMode::Full).expect("full");
        display.show(&frame, RefreshMode::Partial).expect("partial");

        let written = String::from_utf8(display.into_inner()).expect("utf8 output");
        assert!(written.starts_with(CLEAR_SCREEN));
        assert_eq!(written.matches(CLEAR_SCREEN).count(), 1);
        assert_eq!(written.matches("hello").count(), 2);
    }

    #[test]
    fn commands_map_to_buttons() {
        assert_eq!(parse_command("n"), Some((Button::Next, false)));
        assert_eq!(parse_command(" P "), Some((Button::Prev, true)));
        assert_eq!(parse_command("m"), Some((Button::Menu, false)));
        assert_eq!(parse_command("B"), Some((Button::Back, true)));
        assert_eq!(parse_command("x"), None);
        assert_eq!(parse_command("nn"), None);
    }
}
