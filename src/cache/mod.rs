mod assets;
pub mod budget;
mod inflight;
pub mod maintenance;
pub mod prune;
mod queue;

use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;

use crate::config::{Budgets, CacheConfig};
use crate::db::{CacheStats, Repository, StoreLocation};
use crate::error::Result;
use crate::models::{ArticleCacheOutcome, Readable, Summary, Translation};
use crate::services::{ContentFetcher, ImageFetcher};

pub use assets::ArticleAssets;
pub use budget::BudgetedTable;
pub use inflight::InFlight;
pub use maintenance::{MaintenanceJob, MaintenanceRequest, MaintenanceScheduler};
pub use prune::{entry_id_from_cache_key, PruneReport};
pub use queue::build_offline_queue;

#[derive(Clone)]
pub struct OfflineCache {
    inner: Arc<Inner>,
}

struct Inner {
    repo: Arc<Repository>,
    config: CacheConfig,
    fetcher: Arc<dyn ImageFetcher>,
    articles: InFlight<i64, ArticleCacheOutcome>,
    images: InFlight<String, bool>,
    maintenance: MaintenanceScheduler,
}

impl OfflineCache {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let location = StoreLocation::from_config(config.db_path.as_deref());
        let repo = Arc::new(Repository::new(location, config.retry.into()));

        let job: MaintenanceJob = {
            let repo = Arc::clone(&repo);
            let budgets = config.budgets;
            Arc::new(move || enforce_budgets(Arc::clone(&repo), budgets).map(|_| ()).boxed())
        };
        let maintenance = MaintenanceScheduler::new(config.maintenance_interval(), job);

        Self {
            inner: Arc::new(Inner {
                repo,
                config,
                fetcher,
                articles: InFlight::new(),
                images: InFlight::new(),
                maintenance,
            }),
        }
    }

    /// Cache that downloads images over HTTP.
    pub fn with_http(config: CacheConfig) -> Result<Self> {
        let fetcher = ContentFetcher::new(config.image_timeout())?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // Readable content

    pub async fn get_readable(&self, entry_id: i64) -> Option<Readable> {
        miss("get_readable", self.inner.repo.get_readable(entry_id).await)
    }

    /// Store readable content together with its meta row.
    pub async fn set_readable(&self, record: Readable) -> bool {
        let stored = best_effort("set_readable", self.inner.repo.put_readable(record, None).await);
        self.schedule_maintenance();
        stored
    }

    /// Read-through hint: refresh recency for an already cached article.
    /// Never creates a row.
    pub async fn mark_access(&self, entry_id: i64) -> bool {
        match self.inner.repo.mark_access(entry_id).await {
            Ok(touched) => touched,
            Err(e) => {
                tracing::warn!(entry_id, error = %e, "Failed to mark offline access");
                false
            }
        }
    }

    // Images

    pub async fn get_image(&self, url: &str) -> Option<Vec<u8>> {
        miss("get_image", self.inner.repo.get_image(url).await)
    }

    pub async fn set_image(&self, url: &str, data: Vec<u8>) -> bool {
        let stored = best_effort("set_image", self.inner.repo.put_image(url, data).await);
        self.schedule_maintenance();
        stored
    }

    // AI payloads

    pub async fn get_summary(&self, cache_key: &str) -> Option<Summary> {
        miss("get_summary", self.inner.repo.get_summary(cache_key).await).map(|c| c.summary)
    }

    pub async fn set_summary(&self, cache_key: &str, entry_id: i64, summary: &Summary) -> bool {
        let stored = best_effort(
            "set_summary",
            self.inner.repo.put_summary(cache_key, entry_id, summary).await,
        );
        self.schedule_maintenance();
        stored
    }

    pub async fn get_translation(&self, cache_key: &str) -> Option<Translation> {
        miss("get_translation", self.inner.repo.get_translation(cache_key).await)
            .map(|c| c.translation)
    }

    pub async fn set_translation(
        &self,
        cache_key: &str,
        entry_id: i64,
        translation: &Translation,
    ) -> bool {
        let stored = best_effort(
            "set_translation",
            self.inner.repo.put_translation(cache_key, entry_id, translation).await,
        );
        self.schedule_maintenance();
        stored
    }

    // Housekeeping

    /// Delete every row whose owning entry is not in `keep`, then force a
    /// budget pass.
    pub async fn prune_offline_cache<I>(&self, keep: I) -> PruneReport
    where
        I: IntoIterator<Item = i64>,
    {
        let keep: Arc<HashSet<i64>> = Arc::new(keep.into_iter().collect());
        let retained = keep.len();

        let report = match self
            .inner
            .repo
            .run("prune", move |conn| prune::prune(conn, &keep))
            .await
        {
            Ok(report) => {
                tracing::info!(retained, removed = report.total(), "Pruned offline cache");
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "Offline cache prune failed");
                PruneReport::default()
            }
        };

        self.inner.maintenance.request(true);
        report
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.repo.stats().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read offline cache stats");
            CacheStats::default()
        })
    }

    pub fn run_maintenance(&self, force: bool) -> MaintenanceRequest {
        self.inner.maintenance.request(force)
    }

    /// Resolves once no maintenance run is in flight.
    pub async fn maintenance_idle(&self) {
        self.inner.maintenance.idle().await
    }

    fn schedule_maintenance(&self) {
        self.inner.maintenance.request(false);
    }
}

/// One budget pass over every budgeted table. Returns the number of rows evicted.
pub async fn enforce_budgets(repo: Arc<Repository>, budgets: Budgets) -> usize {
    let mut evicted = 0;
    for table in BudgetedTable::ALL {
        let limit = table.limit(&budgets);
        match repo
            .run(table.name(), move |conn| budget::enforce(conn, table, limit))
            .await
        {
            Ok(0) => {}
            Ok(n) => {
                tracing::info!(table = table.name(), evicted = n, limit, "Evicted offline cache rows");
                evicted += n;
            }
            Err(e) => {
                tracing::warn!(table = table.name(), error = %e, "Budget enforcement failed");
            }
        }
    }
    evicted
}

fn miss<T>(operation: &str, result: Result<Option<T>>) -> Option<T> {
    match result {
        Ok(Some(value)) => {
            tracing::debug!(operation, "Offline cache hit");
            Some(value)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(operation, error = %e, "Offline cache read failed");
            None
        }
    }
}

fn best_effort<T>(operation: &str, result: Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(operation, error = %e, "Offline cache write failed");
            false
        }
    }
}
