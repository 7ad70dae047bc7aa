use super::defaults;
use super::io::expand_home;
use crate::input::DebounceConfig;
use crate::pagination::{GlyphMetrics, RenderParams, Viewport};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Flat runtime configuration built from the sectioned config file.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default = "defaults::default_books_dir")]
    pub books_dir: String,
    #[serde(default = "defaults::default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "defaults::default_state_dir")]
    pub state_dir: String,
    #[serde(default = "defaults::default_autosave_secs")]
    pub autosave_secs: u64,
    #[serde(default = "defaults::default_display_width")]
    pub display_width: u32,
    #[serde(default = "defaults::default_display_height")]
    pub display_height: u32,
    #[serde(default = "defaults::default_margin")]
    pub margin: u32,
    #[serde(default = "defaults::default_full_refresh_interval")]
    pub full_refresh_interval: u32,
    #[serde(default = "defaults::default_initial_pages")]
    pub initial_pages: usize,
    #[serde(default = "defaults::default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "defaults::default_long_press_ms")]
    pub long_press_ms: u64,
    #[serde(default = "defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            books_dir: defaults::default_books_dir(),
            cache_dir: defaults::default_cache_dir(),
            state_dir: defaults::default_state_dir(),
            autosave_secs: defaults::default_autosave_secs(),
            display_width: defaults::default_display_width(),
            display_height: defaults::default_display_height(),
            margin: defaults::default_margin(),
            full_refresh_interval: defaults::default_full_refresh_interval(),
            initial_pages: defaults::default_initial_pages(),
            debounce_ms: defaults::default_debounce_ms(),
            long_press_ms: defaults::default_long_press_ms(),
            log_level: defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn books_path(&self) -> PathBuf {
        expand_home(&self.books_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        expand_home(&self.cache_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        expand_home(&self.state_dir)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs.max(1))
    }

    /// Layout parameters for the configured panel with the builtin font.
    pub fn render_params(&self) -> RenderParams {
        let metrics = GlyphMetrics::builtin();
        let viewport = Viewport::for_display(
            self.display_width,
            self.display_height,
            self.margin,
            &metrics,
        );
        RenderParams::new(metrics, viewport)
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            long_press: Duration::from_millis(self.long_press_ms),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
