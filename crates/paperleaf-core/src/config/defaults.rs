pub(crate) fn default_books_dir() -> String {
    "~/books".to_string()
}

pub(crate) fn default_cache_dir() -> String {
    "~/.ebook_cache".to_string()
}

pub(crate) fn default_state_dir() -> String {
    "~/.ebook_reader".to_string()
}

pub(crate) fn default_autosave_secs() -> u64 {
    60
}

pub(crate) fn default_display_width() -> u32 {
    300
}

pub(crate) fn default_display_height() -> u32 {
    400
}

pub(crate) fn default_margin() -> u32 {
    4
}

pub(crate) fn default_full_refresh_interval() -> u32 {
    100
}

pub(crate) fn default_initial_pages() -> usize {
    50
}

pub(crate) fn default_debounce_ms() -> u64 {
    30
}

pub(crate) fn default_long_press_ms() -> u64 {
    500
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}
