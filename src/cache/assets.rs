use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use crate::models::{ArticleCacheOutcome, ArticleMetadata, OfflinePriority, Readable};

use super::OfflineCache;

/// Everything the composite article write needs.
#[derive(Debug, Clone)]
pub struct ArticleAssets {
    pub entry_id: i64,
    pub content: String,
    pub metadata: ArticleMetadata,
    pub image_urls: Vec<String>,
    pub cover_url: Option<String>,
    pub priority: OfflinePriority,
    pub cache_images: bool,
}

impl ArticleAssets {
    pub fn new(entry_id: i64, content: impl Into<String>) -> Self {
        Self {
            entry_id,
            content: content.into(),
            metadata: ArticleMetadata::default(),
            image_urls: Vec::new(),
            cover_url: None,
            priority: OfflinePriority::default(),
            cache_images: false,
        }
    }

    pub fn metadata(mut self, metadata: ArticleMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn images(mut self, image_urls: Vec<String>, cover_url: Option<String>) -> Self {
        self.image_urls = image_urls;
        self.cover_url = cover_url;
        self
    }

    pub fn priority(mut self, priority: OfflinePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn cache_images(mut self, cache_images: bool) -> Self {
        self.cache_images = cache_images;
        self
    }
}

impl OfflineCache {
    /// Cache an article's readable content and, optionally, its images.
    ///
    /// Concurrent calls for the same entry share one write. Image failures are
    /// isolated; they only lower `cached_images`.
    pub async fn cache_article_assets(&self, assets: ArticleAssets) -> ArticleCacheOutcome {
        if assets.content.trim().is_empty() {
            return ArticleCacheOutcome::default();
        }

        let entry_id = assets.entry_id;
        let cache = self.clone();
        self.inner
            .articles
            .run(entry_id, move || async move { cache.write_article(assets).await })
            .await
            .unwrap_or_default()
    }

    async fn write_article(&self, assets: ArticleAssets) -> ArticleCacheOutcome {
        let entry_id = assets.entry_id;
        let candidates = if assets.cache_images {
            image_candidates(
                &assets.image_urls,
                assets.cover_url.as_deref(),
                self.inner.config.max_images,
            )
        } else {
            Vec::new()
        };

        let record = Readable::new(entry_id, assets.content, assets.metadata)
            .with_images(assets.image_urls, assets.cover_url);
        if let Err(e) = self
            .inner
            .repo
            .put_readable(record, Some(assets.priority))
            .await
        {
            tracing::warn!(entry_id, error = %e, "Failed to cache readable content");
            return ArticleCacheOutcome::default();
        }

        let concurrency = self.inner.config.image_concurrency.max(1);
        let results: Vec<bool> = stream::iter(candidates)
            .map(|url| {
                let cache = self.clone();
                async move { cache.cache_image(url).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        let cached_images = results.into_iter().filter(|cached| *cached).count();

        tracing::debug!(entry_id, cached_images, "Cached article for offline reading");
        self.schedule_maintenance();

        ArticleCacheOutcome {
            cached_readable: true,
            cached_images,
        }
    }

    /// Fetch and store one image, sharing the work with concurrent callers for
    /// the same URL.
    async fn cache_image(&self, url: String) -> bool {
        let cache = self.clone();
        self.inner
            .images
            .run(url.clone(), move || async move {
                cache.fetch_and_store_image(&url).await
            })
            .await
            .unwrap_or(false)
    }

    async fn fetch_and_store_image(&self, url: &str) -> bool {
        match self.inner.repo.has_image(url).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => tracing::debug!(url, error = %e, "Image lookup failed, fetching anyway"),
        }

        let data = match self.inner.fetcher.fetch(url).await {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                tracing::debug!(url, "Skipping empty image");
                return false;
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "Image fetch failed");
                return false;
            }
        };

        match self.inner.repo.put_image(url, data).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to cache image");
                false
            }
        }
    }
}

/// Cover first, then the article's images: http(s) only, de-duplicated, capped.
fn image_candidates(image_urls: &[String], cover_url: Option<&str>, max_images: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    cover_url
        .into_iter()
        .chain(image_urls.iter().map(String::as_str))
        .map(str::trim)
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter(|url| seen.insert(*url))
        .take(max_images)
        .map(str::to_string)
        .collect()
}
