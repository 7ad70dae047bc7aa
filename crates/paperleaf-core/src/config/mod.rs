//! Configuration loading for the reader.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! defaults so the device still boots into something readable.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{expand_home, load_config, parse_config};
pub use models::{AppConfig, LogLevel};
