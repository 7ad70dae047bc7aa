//! Screen descriptions and the path from a screen to the panel.
//!
//! The core only builds [`Screen`] values. A [`Renderer`] turns one into an
//! image and a [`Display`] pushes that image to the panel with a refresh
//! mode picked by [`RefreshPolicy`].

use std::fmt;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Reading {
        title: String,
        lines: Vec<String>,
        footer: String,
    },
    Menu {
        title: String,
        items: Vec<String>,
        selected: usize,
    },
    Browser {
        items: Vec<String>,
        selected: usize,
        notice: Option<String>,
    },
    Sleep,
    Notice {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Complete waveform; clears ghosting.
    Full,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Rasterize(String),
    Display(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Rasterize(reason) => write!(f, "failed to draw screen: {reason}"),
            RenderError::Display(reason) => write!(f, "display refresh failed: {reason}"),
        }
    }
}

impl std::error::Error for RenderError {}

pub trait Renderer {
    type Image;

    fn render(&mut self, screen: &Screen) -> Result<Self::Image, RenderError>;
}

pub trait Display {
    type Image;

    fn show(&mut self, image: &Self::Image, mode: RefreshMode) -> Result<(), RenderError>;

    /// Put the panel into its low-power state. The last image stays visible.
    fn sleep(&mut self) {}

    fn wake(&mut self) {}
}

/// Chooses between full and partial refreshes.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    full_refresh_interval: u32,
    partials_since_full: u32,
    needs_full: bool,
}

impl RefreshPolicy {
    pub fn new(full_refresh_interval: u32) -> Self {
        Self {
            full_refresh_interval,
            partials_since_full: 0,
            needs_full: true,
        }
    }

    /// Force the next frame to be a full refresh.
    pub fn request_full(&mut self) {
        self.needs_full = true;
    }

    pub fn resolve(&self, requested: RefreshMode) -> RefreshMode {
        let interval_due = self.full_refresh_interval > 0
            && self.partials_since_full >= self.full_refresh_interval;
        if self.needs_full || requested == RefreshMode::Full || interval_due {
            RefreshMode::Full
        } else {
            RefreshMode::Partial
        }
    }

    /// Record a frame that reached the panel.
    pub fn record(&mut self, mode: RefreshMode) {
        match mode {
            RefreshMode::Full => {
                self.needs_full = false;
                self.partials_since_full = 0;
            }
            RefreshMode::Partial => self.partials_since_full += 1,
        }
    }
}

/// Renders screens and pushes them to the display, retrying once.
pub struct RenderDispatcher<R, D> {
    renderer: R,
    display: D,
    policy: RefreshPolicy,
}

impl<R, D> RenderDispatcher<R, D>
where
    R: Renderer,
    D: Display<Image = R::Image>,
{
    pub fn new(renderer: R, display: D, policy: RefreshPolicy) -> Self {
        Self {
            renderer,
            display,
            policy,
        }
    }

    pub fn sleep(&mut self) {
        self.display.sleep();
    }

    /// Wake the panel; the next frame is a full refresh.
    pub fn wake(&mut self) {
        self.display.wake();
        self.policy.request_full();
    }

    fn draw(&mut self, screen: &Screen, mode: RefreshMode) -> Result<(), RenderError> {
        let image = self.renderer.render(screen)?;
        self.display.show(&image, mode)
    }

    /// Show `screen`. On a second failure an error notice is attempted and
    /// the error is returned.
    pub fn present(&mut self, screen: &Screen, requested: RefreshMode) -> Result<(), RenderError> {
        let mode = self.policy.resolve(requested);
        let first = match self.draw(screen, mode) {
            Ok(()) => {
                debug!(?mode, "Frame presented");
                self.policy.record(mode);
                return Ok(());
            }
            Err(err) => err,
        };
        warn!("Render failed, retrying: {first}");
        match self.draw(screen, RefreshMode::Full) {
            Ok(()) => {
                self.policy.record(RefreshMode::Full);
                Ok(())
            }
            Err(err) => {
                error!("Render failed twice: {err}");
                let notice = Screen::Notice {
                    message: format!("Display error: {err}"),
                };
                if self.draw(&notice, RefreshMode::Full).is_ok() {
                    self.policy.record(RefreshMode::Full);
                }
                Err(err)
            }
        }
    }

    pub fn into_parts(self) -> (R, D) {
        (self.renderer, self.display)
    }
}
