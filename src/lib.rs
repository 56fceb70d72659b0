//! Offline content cache for the speedy-reader RSS client.
//!
//! Readable article content, images and AI payloads are kept in a single
//! SQLite store with per-table row budgets, LRU eviction and a pruner that
//! drops everything belonging to entries the reader no longer keeps.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use cache::{build_offline_queue, ArticleAssets, OfflineCache, PruneReport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use models::*;
