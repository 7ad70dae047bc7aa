use super::defaults;
use super::models::{AppConfig, LogLevel};
use serde::Deserialize;

/// On-disk layout of the config file, one table per concern.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    library: LibraryConfig,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    layout: LayoutConfig,
    #[serde(default)]
    input: InputConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            books_dir: tables.library.books_dir,
            cache_dir: tables.library.cache_dir,
            state_dir: tables.library.state_dir,
            autosave_secs: tables.library.autosave_secs,
            display_width: tables.display.width,
            display_height: tables.display.height,
            margin: tables.display.margin,
            full_refresh_interval: tables.display.full_refresh_interval,
            initial_pages: tables.layout.initial_pages,
            debounce_ms: tables.input.debounce_ms,
            long_press_ms: tables.input.long_press_ms,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            library: LibraryConfig {
                books_dir: config.books_dir.clone(),
                cache_dir: config.cache_dir.clone(),
                state_dir: config.state_dir.clone(),
                autosave_secs: config.autosave_secs,
            },
            display: DisplayConfig {
                width: config.display_width,
                height: config.display_height,
                margin: config.margin,
                full_refresh_interval: config.full_refresh_interval,
            },
            layout: LayoutConfig {
                initial_pages: config.initial_pages,
            },
            input: InputConfig {
                debounce_ms: config.debounce_ms,
                long_press_ms: config.long_press_ms,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LibraryConfig {
    #[serde(default = "defaults::default_books_dir")]
    books_dir: String,
    #[serde(default = "defaults::default_cache_dir")]
    cache_dir: String,
    #[serde(default = "defaults::default_state_dir")]
    state_dir: String,
    #[serde(default = "defaults::default_autosave_secs")]
    autosave_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        LibraryConfig {
            books_dir: defaults::default_books_dir(),
            cache_dir: defaults::default_cache_dir(),
            state_dir: defaults::default_state_dir(),
            autosave_secs: defaults::default_autosave_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct DisplayConfig {
    #[serde(default = "defaults::default_display_width")]
    width: u32,
    #[serde(default = "defaults::default_display_height")]
    height: u32,
    #[serde(default = "defaults::default_margin")]
    margin: u32,
    #[serde(default = "defaults::default_full_refresh_interval")]
    full_refresh_interval: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: defaults::default_display_width(),
            height: defaults::default_display_height(),
            margin: defaults::default_margin(),
            full_refresh_interval: defaults::default_full_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LayoutConfig {
    #[serde(default = "defaults::default_initial_pages")]
    initial_pages: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            initial_pages: defaults::default_initial_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct InputConfig {
    #[serde(default = "defaults::default_debounce_ms")]
    debounce_ms: u64,
    #[serde(default = "defaults::default_long_press_ms")]
    long_press_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            debounce_ms: defaults::default_debounce_ms(),
            long_press_ms: defaults::default_long_press_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
