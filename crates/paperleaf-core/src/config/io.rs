use super::models::AppConfig;
use super::tables::ConfigTables;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Load the config file at `path`, falling back to defaults on any problem.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str::<ConfigTables>(contents).map(AppConfig::from)
}

#[cfg(test)]
fn serialize_config(config: &AppConfig) -> Result<String, toml::ser::Error> {
    toml::to_string(&ConfigTables::from(config))
}

/// Replace a leading `~` with `$HOME`.
pub fn expand_home(raw: &str) -> PathBuf {
    let home = || env::var_os("HOME").map(PathBuf::from);
    if raw == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").expect("empty config parses");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.books_dir, "~/books");
        assert_eq!(cfg.cache_dir, "~/.ebook_cache");
        assert_eq!(cfg.state_dir, "~/.ebook_reader");
        assert_eq!((cfg.display_width, cfg.display_height), (300, 400));
        assert_eq!(cfg.initial_pages, 50);
        assert_eq!(cfg.full_refresh_interval, 100);
        assert_eq!(cfg.debounce().debounce, Duration::from_millis(30));
        assert_eq!(cfg.debounce().long_press, Duration::from_millis(500));
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn sectioned_tables_fill_flat_config() {
        let cfg = parse_config(
            r#"
            [library]
            books_dir = "/mnt/books"

            [display]
            width = 480
            height = 800

            [layout]
            initial_pages = 20

            [input]
            long_press_ms = 650

            [logging]
            log_level = "warn"
            "#,
        )
        .expect("config parses");

        assert_eq!(cfg.books_path(), PathBuf::from("/mnt/books"));
        assert_eq!((cfg.display_width, cfg.display_height), (480, 800));
        assert_eq!(cfg.margin, 4);
        assert_eq!(cfg.initial_pages, 20);
        assert_eq!(cfg.long_press_ms, 650);
        assert_eq!(cfg.debounce_ms, 30);
        assert_eq!(cfg.log_level, LogLevel::Warn);
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut cfg = AppConfig::default();
        cfg.display_width = 600;
        cfg.log_level = LogLevel::Info;
        let text = serialize_config(&cfg).expect("serialize");
        assert!(text.contains("[display]"));
        assert_eq!(parse_config(&text).expect("parse"), cfg);
    }

    #[test]
    fn invalid_or_missing_file_falls_back() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("paperleaf_test_config_{nanos}.toml"));
        assert_eq!(load_config(&path), AppConfig::default());

        fs::write(&path, "[display]\nwidth = \"wide\"\n").expect("write config");
        assert_eq!(load_config(&path), AppConfig::default());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn render_params_follow_display_size() {
        let small = AppConfig::default().render_params();
        let mut cfg = AppConfig::default();
        cfg.display_width = 480;
        let wide = cfg.render_params();
        assert_eq!(small.viewport.width, 292);
        assert_ne!(small.params_hash(), wide.params_hash());
    }

    #[test]
    fn home_prefix_expands() {
        let Some(home) = env::var_os("HOME").map(PathBuf::from) else {
            return;
        };
        assert_eq!(expand_home("~/books"), home.join("books"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/abs/~/x"), PathBuf::from("/abs/~/x"));
    }
}
