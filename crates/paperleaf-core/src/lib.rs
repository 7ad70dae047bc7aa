//! Book processing, pagination and navigation for a four-button e-paper reader.

pub mod background;
pub mod bookmarks;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod epub_loader;
pub mod input;
pub mod library;
pub mod navigation;
pub mod pagination;
pub mod render;
pub mod session;
pub mod text_utils;
