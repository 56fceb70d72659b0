use anyhow::{bail, Context};

use speedy_offline_cache::services::{extract_image_urls_from_html, ContentFetcher};
use speedy_offline_cache::{ArticleAssets, ArticleMetadata, CacheConfig, OfflineCache};

const USAGE: &str = "usage: offline-cache [--stats | --maintain | --prune <id,id,...> | --fetch <entry_id> <url>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Only show warnings and errors by default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = CacheConfig::load()?;
    let cache = OfflineCache::with_http(config.clone())?;

    match args.get(1).map(String::as_str) {
        None | Some("--stats") => {}
        Some("--maintain") => {
            cache.run_maintenance(true);
            cache.maintenance_idle().await;
            println!("Maintenance finished");
        }
        Some("--prune") => {
            let Some(list) = args.get(2) else {
                bail!(USAGE);
            };
            let keep = parse_ids(list)?;
            let report = cache.prune_offline_cache(keep).await;
            cache.maintenance_idle().await;
            println!(
                "Pruned {} rows (readable {}, meta {}, image {}, summary {}, translation {})",
                report.total(),
                report.readable,
                report.meta,
                report.image,
                report.summary,
                report.translation
            );
        }
        Some("--fetch") => {
            let (Some(entry_id), Some(url)) = (args.get(2), args.get(3)) else {
                bail!(USAGE);
            };
            let entry_id: i64 = entry_id
                .parse()
                .with_context(|| format!("invalid entry id: {entry_id}"))?;

            let fetcher = ContentFetcher::new(config.image_timeout())?;
            let Some(html) = fetcher.fetch_html(url).await? else {
                bail!("could not fetch {url}");
            };
            let images = extract_image_urls_from_html(&html, url);
            let metadata = ArticleMetadata {
                source_url: Some(url.clone()),
                ..Default::default()
            };

            let outcome = cache
                .cache_article_assets(
                    ArticleAssets::new(entry_id, html)
                        .metadata(metadata)
                        .images(images, None)
                        .cache_images(true),
                )
                .await;
            cache.maintenance_idle().await;

            if !outcome.cached_readable {
                bail!("failed to cache entry {entry_id}");
            }
            println!("Cached entry {} with {} images", entry_id, outcome.cached_images);
        }
        Some(_) => bail!(USAGE),
    }

    let stats = cache.stats().await;
    println!(
        "readable: {}  meta: {}  image: {}  summary: {}  translation: {}",
        stats.readable, stats.meta, stats.image, stats.summary, stats.translation
    );

    Ok(())
}

fn parse_ids(list: &str) -> anyhow::Result<Vec<i64>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().with_context(|| format!("invalid entry id: {s}")))
        .collect()
}
