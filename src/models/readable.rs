use serde::{Deserialize, Serialize};

use super::OfflinePriority;

/// Extracted article metadata handed over by the readability pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    pub source_url: Option<String>,
}

/// Readable (extracted) article content, keyed by entry id.
#[derive(Debug, Clone, PartialEq)]
pub struct Readable {
    pub entry_id: i64,
    pub content: String,
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    pub source_url: Option<String>,
    pub image_urls: Vec<String>,
    pub cover_url: Option<String>,
    /// Epoch milliseconds.
    pub cached_at: i64,
}

impl Readable {
    pub fn new(entry_id: i64, content: impl Into<String>, metadata: ArticleMetadata) -> Self {
        Self {
            entry_id,
            content: content.into(),
            title: metadata.title,
            byline: metadata.byline,
            excerpt: metadata.excerpt,
            source_url: metadata.source_url,
            image_urls: Vec::new(),
            cover_url: None,
            cached_at: 0,
        }
    }

    pub fn with_images(mut self, image_urls: Vec<String>, cover_url: Option<String>) -> Self {
        self.image_urls = image_urls;
        self.cover_url = cover_url;
        self
    }
}

/// Access metadata paired one-to-one with a `Readable` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub entry_id: i64,
    pub priority: OfflinePriority,
    pub cached_at: i64,
    pub last_accessed: i64,
}

/// Outcome of the composite article write path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArticleCacheOutcome {
    pub cached_readable: bool,
    pub cached_images: usize,
}
