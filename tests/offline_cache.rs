use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio_test::assert_ok;

use speedy_offline_cache::cache::MaintenanceRequest;
use speedy_offline_cache::services::ImageFetcher;
use speedy_offline_cache::{
    build_offline_queue, ArticleAssets, ArticleCacheOutcome, ArticleMetadata, CacheConfig,
    CacheError, OfflineCache, OfflinePriority, QueueCandidate, Readable, Summary, Translation,
};

#[derive(Default)]
struct MockFetcher {
    delay: Option<Duration>,
    failing: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl ImageFetcher for MockFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, speedy_offline_cache::Result<Vec<u8>>> {
        async move {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.iter().any(|f| f == url) {
                return Err(CacheError::Fetch(format!("{url}: HTTP 404 Not Found")));
            }
            Ok(format!("bytes of {url}").into_bytes())
        }
        .boxed()
    }
}

fn config() -> CacheConfig {
    CacheConfig::in_memory()
}

fn cache_with(config: CacheConfig, fetcher: Arc<MockFetcher>) -> OfflineCache {
    OfflineCache::new(config, fetcher)
}

fn readable(entry_id: i64) -> Readable {
    Readable::new(
        entry_id,
        format!("<p>Article {entry_id}</p>"),
        ArticleMetadata {
            title: Some(format!("Article {entry_id}")),
            ..Default::default()
        },
    )
}

fn summary(text: &str) -> Summary {
    Summary {
        summary: text.to_string(),
        key_points: vec!["one".to_string()],
        sentiment: "neutral".to_string(),
        questions: Vec::new(),
        model: "test-model".to_string(),
        created_at: Utc::now(),
    }
}

fn translation(text: &str) -> Translation {
    Translation {
        text: text.to_string(),
        bullets: None,
        source_language: "de".to_string(),
        target_language: "en".to_string(),
        output_style: "full".to_string(),
        model: "test-model".to_string(),
        created_at: Utc::now(),
    }
}

async fn settle(cache: &OfflineCache) {
    cache.run_maintenance(true);
    cache.maintenance_idle().await;
}

#[tokio::test]
async fn readable_round_trip_creates_meta() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));

    assert!(cache.get_readable(1).await.is_none());
    assert!(cache.set_readable(readable(1)).await);

    let stored = cache.get_readable(1).await.unwrap();
    assert_eq!(stored.title.as_deref(), Some("Article 1"));

    let meta = assert_ok!(cache.repository().get_meta(1).await).unwrap();
    assert_eq!(meta.priority, OfflinePriority::Unread);
    assert_eq!(meta.cached_at, stored.cached_at);
}

#[tokio::test]
async fn mark_access_never_creates_rows() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));

    assert!(!cache.mark_access(42).await);
    assert!(cache.get_readable(42).await.is_none());
    assert_eq!(cache.stats().await.meta, 0);
}

#[tokio::test]
async fn ai_payloads_round_trip() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));

    assert!(cache.set_summary("sum:7:abc", 7, &summary("short")).await);
    assert!(cache.set_translation("tr:7:en", 7, &translation("hello")).await);

    assert_eq!(cache.get_summary("sum:7:abc").await.unwrap().summary, "short");
    assert_eq!(cache.get_translation("tr:7:en").await.unwrap().text, "hello");
    assert!(cache.get_summary("sum:8:abc").await.is_none());
}

#[tokio::test]
async fn corrupt_records_read_as_misses() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));
    assert!(cache.set_readable(readable(1)).await);
    assert!(cache.set_summary("sum:1:x", 1, &summary("fine")).await);
    assert!(cache.set_translation("tr:1:en", 1, &translation("fine")).await);

    assert_ok!(
        cache
            .repository()
            .run("corrupt", |conn| {
                conn.execute("UPDATE summary SET payload = '{not json' WHERE cache_key = 'sum:1:x'", [])?;
                conn.execute("UPDATE translation SET payload = '42' WHERE cache_key = 'tr:1:en'", [])?;
                conn.execute("UPDATE readable SET image_urls = 'nope' WHERE entry_id = 1", [])
            })
            .await
    );

    assert!(matches!(
        cache.repository().get_summary("sum:1:x").await,
        Err(CacheError::CorruptRecord(_))
    ));
    assert!(cache.get_summary("sum:1:x").await.is_none());
    assert!(cache.get_translation("tr:1:en").await.is_none());
    assert!(cache.get_readable(1).await.is_none());

    // Overwriting a corrupt row repairs it.
    assert!(cache.set_summary("sum:1:x", 1, &summary("again")).await);
    assert_eq!(cache.get_summary("sum:1:x").await.unwrap().summary, "again");
}

#[tokio::test]
async fn prune_keeps_only_listed_entries() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));

    for id in [1, 2] {
        let image = format!("https://img.test/{id}.png");
        assert!(cache.set_readable(readable(id).with_images(vec![image.clone()], None)).await);
        assert!(cache.set_image(&image, vec![1, 2, 3]).await);
    }
    assert!(cache.set_summary("sum:1:x", 1, &summary("one")).await);
    assert!(cache.set_summary("sum:2:x", 2, &summary("two")).await);
    assert!(cache.set_translation("tr:2:en", 2, &translation("two")).await);

    let report = cache.prune_offline_cache([1]).await;
    cache.maintenance_idle().await;

    assert_eq!(report.readable, 1);
    assert_eq!(report.meta, 1);
    assert_eq!(report.image, 1);
    assert_eq!(report.summary, 1);
    assert_eq!(report.translation, 1);

    assert!(cache.get_readable(1).await.is_some());
    assert!(cache.get_image("https://img.test/1.png").await.is_some());
    assert!(cache.get_summary("sum:1:x").await.is_some());

    assert!(cache.get_readable(2).await.is_none());
    assert!(cache.get_image("https://img.test/2.png").await.is_none());
    assert!(cache.get_summary("sum:2:x").await.is_none());
    assert!(cache.get_translation("tr:2:en").await.is_none());
}

#[tokio::test]
async fn prune_with_empty_keep_set_clears_everything() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));
    assert!(cache.set_readable(readable(1)).await);
    assert!(cache.set_image("https://img.test/orphan.png", vec![9]).await);

    cache.prune_offline_cache(Vec::new()).await;
    cache.maintenance_idle().await;

    let stats = cache.stats().await;
    assert_eq!((stats.readable, stats.meta, stats.image), (0, 0, 0));
}

#[tokio::test]
async fn image_budget_evicts_oldest() {
    let mut config = config();
    config.budgets.image = 2;
    let cache = cache_with(config, Arc::new(MockFetcher::default()));

    for url in ["https://img.test/u1", "https://img.test/u2", "https://img.test/u3"] {
        assert!(cache.set_image(url, url.as_bytes().to_vec()).await);
    }
    settle(&cache).await;

    assert!(cache.get_image("https://img.test/u1").await.is_none());
    assert!(cache.get_image("https://img.test/u2").await.is_some());
    assert!(cache.get_image("https://img.test/u3").await.is_some());
    assert_eq!(cache.stats().await.image, 2);
}

#[tokio::test]
async fn readable_eviction_follows_last_access() {
    let mut config = config();
    config.budgets.readable = 2;
    let cache = cache_with(config, Arc::new(MockFetcher::default()));

    for id in [1, 2] {
        assert!(cache.set_readable(readable(id)).await);
    }
    // 1 becomes the most recently used, so 2 is now the oldest
    assert!(cache.mark_access(1).await);
    assert!(cache.set_readable(readable(3)).await);
    settle(&cache).await;

    assert!(cache.get_readable(1).await.is_some());
    assert!(cache.get_readable(2).await.is_none());
    assert!(cache.get_readable(3).await.is_some());

    let stats = cache.stats().await;
    assert_eq!(stats.readable, 2);
    assert_eq!(stats.meta, 2);
    assert!(assert_ok!(cache.repository().get_meta(2).await).is_none());
}

#[tokio::test]
async fn forced_maintenance_bypasses_throttle() {
    let cache = cache_with(config(), Arc::new(MockFetcher::default()));

    assert_eq!(cache.run_maintenance(false), MaintenanceRequest::Started);
    cache.maintenance_idle().await;
    assert_eq!(cache.run_maintenance(false), MaintenanceRequest::Throttled);
    assert_eq!(cache.run_maintenance(true), MaintenanceRequest::Started);
    cache.maintenance_idle().await;
}

#[tokio::test]
async fn empty_content_is_not_cached() {
    let fetcher = Arc::new(MockFetcher::default());
    let cache = cache_with(config(), fetcher.clone());

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(5, "   \n")
                .images(vec!["https://img.test/a".to_string()], None)
                .cache_images(true),
        )
        .await;

    assert_eq!(outcome, ArticleCacheOutcome::default());
    assert_eq!(fetcher.total_calls(), 0);
    assert!(cache.get_readable(5).await.is_none());
}

#[tokio::test]
async fn article_assets_store_readable_meta_and_images() {
    let fetcher = Arc::new(MockFetcher::default());
    let cache = cache_with(config(), fetcher.clone());

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(9, "<p>Body</p>")
                .images(
                    vec!["https://img.test/a".to_string(), "https://img.test/b".to_string()],
                    Some("https://img.test/cover".to_string()),
                )
                .priority(OfflinePriority::Starred)
                .cache_images(true),
        )
        .await;

    assert!(outcome.cached_readable);
    assert_eq!(outcome.cached_images, 3);
    assert_eq!(fetcher.calls("https://img.test/cover"), 1);

    let meta = assert_ok!(cache.repository().get_meta(9).await).unwrap();
    assert_eq!(meta.priority, OfflinePriority::Starred);

    let stored = cache.get_readable(9).await.unwrap();
    assert_eq!(stored.cover_url.as_deref(), Some("https://img.test/cover"));
    assert!(cache.get_image("https://img.test/b").await.is_some());
}

#[tokio::test]
async fn images_are_skipped_unless_requested() {
    let fetcher = Arc::new(MockFetcher::default());
    let cache = cache_with(config(), fetcher.clone());

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(3, "<p>Body</p>").images(vec!["https://img.test/a".to_string()], None),
        )
        .await;

    assert_eq!(
        outcome,
        ArticleCacheOutcome {
            cached_readable: true,
            cached_images: 0
        }
    );
    assert_eq!(fetcher.total_calls(), 0);
}

#[tokio::test]
async fn failing_image_does_not_affect_the_others() {
    let fetcher = Arc::new(MockFetcher::failing(&["https://img.test/broken"]));
    let cache = cache_with(config(), fetcher.clone());

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(4, "<p>Body</p>")
                .images(
                    vec![
                        "https://img.test/ok1".to_string(),
                        "https://img.test/broken".to_string(),
                        "https://img.test/ok2".to_string(),
                    ],
                    None,
                )
                .cache_images(true),
        )
        .await;

    assert!(outcome.cached_readable);
    assert_eq!(outcome.cached_images, 2);
    assert!(cache.get_image("https://img.test/broken").await.is_none());
    assert!(cache.get_readable(4).await.is_some());
}

#[tokio::test]
async fn cached_images_are_not_fetched_again() {
    let fetcher = Arc::new(MockFetcher::default());
    let cache = cache_with(config(), fetcher.clone());
    assert!(cache.set_image("https://img.test/a", vec![1]).await);

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(6, "<p>Body</p>")
                .images(vec!["https://img.test/a".to_string()], None)
                .cache_images(true),
        )
        .await;

    assert_eq!(outcome.cached_images, 1);
    assert_eq!(fetcher.calls("https://img.test/a"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_article_writes_are_collapsed() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(100)));
    let cache = cache_with(config(), fetcher.clone());
    let images = vec!["https://img.test/a".to_string(), "https://img.test/b".to_string()];

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let assets = ArticleAssets::new(11, "<p>Shared</p>")
                .images(images.clone(), None)
                .cache_images(true);
            tokio::spawn(async move { cache.cache_article_assets(assets).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap());
    }

    assert!(outcomes.iter().all(|o| *o == outcomes[0]));
    assert_eq!(outcomes[0].cached_images, 2);
    assert_eq!(cache.repository().readable_writes(), 1);
    assert_eq!(fetcher.calls("https://img.test/a"), 1);
    assert_eq!(fetcher.calls("https://img.test/b"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_images_are_fetched_once_across_articles() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(100)));
    let cache = cache_with(config(), fetcher.clone());

    let tasks: Vec<_> = (20..24)
        .map(|id| {
            let cache = cache.clone();
            let assets = ArticleAssets::new(id, "<p>Body</p>")
                .images(vec!["https://img.test/logo".to_string()], None)
                .cache_images(true);
            tokio::spawn(async move { cache.cache_article_assets(assets).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().cached_images, 1);
    }
    assert_eq!(fetcher.calls("https://img.test/logo"), 1);
    assert_eq!(cache.stats().await.readable, 4);
}

#[tokio::test]
async fn pairing_holds_through_writes_eviction_and_prune() {
    let mut config = config();
    config.budgets.readable = 3;
    let cache = cache_with(config, Arc::new(MockFetcher::default()));

    for id in 1..=5 {
        assert!(cache.set_readable(readable(id)).await);
    }
    settle(&cache).await;
    let stats = cache.stats().await;
    assert_eq!(stats.readable, stats.meta);
    assert_eq!(stats.readable, 3);

    cache.prune_offline_cache([4]).await;
    cache.maintenance_idle().await;
    let stats = cache.stats().await;
    assert_eq!((stats.readable, stats.meta), (1, 1));
}

#[tokio::test]
async fn disabled_store_reports_misses() {
    let mut config = config();
    config.db_path = None;
    let fetcher = Arc::new(MockFetcher::default());
    let cache = cache_with(config, fetcher.clone());

    assert!(cache.get_readable(1).await.is_none());
    assert!(!cache.set_readable(readable(1)).await);
    assert!(!cache.set_image("https://img.test/a", vec![1]).await);
    assert!(!cache.mark_access(1).await);
    assert!(cache.get_summary("sum:1:x").await.is_none());

    let outcome = cache
        .cache_article_assets(
            ArticleAssets::new(1, "<p>Body</p>")
                .images(vec!["https://img.test/a".to_string()], None)
                .cache_images(true),
        )
        .await;
    assert_eq!(outcome, ArticleCacheOutcome::default());
    assert_eq!(fetcher.total_calls(), 0);

    assert_eq!(cache.prune_offline_cache([1]).await.total(), 0);
    cache.maintenance_idle().await;

    assert!(matches!(
        cache.repository().get_readable(1).await,
        Err(CacheError::StoreUnavailable)
    ));
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("offline.db");
    let mut config = config();
    config.db_path = Some(path.to_string_lossy().to_string());

    {
        let cache = cache_with(config.clone(), Arc::new(MockFetcher::default()));
        assert!(cache.set_readable(readable(1)).await);
        assert!(cache.set_summary("sum:1:x", 1, &summary("kept")).await);
        cache.maintenance_idle().await;
    }

    let cache = cache_with(config, Arc::new(MockFetcher::default()));
    assert!(cache.get_readable(1).await.is_some());
    assert_eq!(cache.get_summary("sum:1:x").await.unwrap().summary, "kept");
}

#[test]
fn queue_orders_by_priority_then_input() {
    let candidates = [
        QueueCandidate { id: 1, is_starred: false, is_read: true },
        QueueCandidate { id: 2, is_starred: true, is_read: false },
        QueueCandidate { id: 3, is_starred: false, is_read: false },
    ];

    let ids: Vec<i64> = build_offline_queue(&candidates, 2).iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!(build_offline_queue(&candidates, 0).is_empty());
}
