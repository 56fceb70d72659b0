use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::{params, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{
    CachedSummary, CachedTranslation, Meta, OfflinePriority, Readable, Summary, Translation,
};

use super::retry::{with_retry, RetryPolicy};
use super::store::{StoreLocation, StoreManager};

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub readable: usize,
    pub meta: usize,
    pub image: usize,
    pub summary: usize,
    pub translation: usize,
}

/// Typed access to the cache tables.
///
/// Every method goes through the retry wrapper and reports failures as
/// `CacheError`; mapping those to misses is the caller's business.
pub struct Repository {
    store: StoreManager,
    retry: RetryPolicy,
    clock: AtomicI64,
    readable_writes: AtomicU64,
}

struct RawReadable {
    readable: Readable,
    image_urls: String,
}

struct RawPayload {
    cache_key: String,
    entry_id: i64,
    payload: String,
    cached_at: i64,
}

impl Repository {
    pub fn new(location: StoreLocation, retry: RetryPolicy) -> Self {
        Self {
            store: StoreManager::new(location),
            retry,
            clock: AtomicI64::new(0),
            readable_writes: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &StoreManager {
        &self.store
    }

    /// Epoch milliseconds, strictly increasing within this process so that
    /// back-to-back writes still have a well-defined age order.
    pub fn now_ms(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        wall.max(prev + 1)
    }

    /// Committed readable+meta writes since this repository was created.
    pub fn readable_writes(&self) -> u64 {
        self.readable_writes.load(Ordering::Relaxed)
    }

    /// Run `function` against the store with the retry policy applied.
    pub async fn run<F, R>(&self, label: &str, function: F) -> Result<R>
    where
        F: Fn(&mut rusqlite::Connection) -> rusqlite::Result<R> + Clone + Send + 'static,
        R: Send + 'static,
    {
        with_retry(self.retry, label, || self.store.call(function.clone())).await
    }

    // Readable operations

    pub async fn get_readable(&self, entry_id: i64) -> Result<Option<Readable>> {
        let raw = self
            .run("get_readable", move |conn| {
                conn.query_row(
                    r#"SELECT entry_id, content, title, byline, excerpt, source_url, image_urls,
                              cover_url, cached_at
                       FROM readable WHERE entry_id = ?1"#,
                    params![entry_id],
                    raw_readable_from_row,
                )
                .optional()
            })
            .await?;

        raw.map(decode_readable).transpose()
    }

    /// Write a readable row and its meta row in one transaction.
    ///
    /// With `priority` unset an existing meta priority is kept (new rows get
    /// the default). Returns the `cached_at` stamp that was written.
    pub async fn put_readable(
        &self,
        record: Readable,
        priority: Option<OfflinePriority>,
    ) -> Result<i64> {
        let now = self.now_ms();
        let image_urls = serde_json::to_string(&record.image_urls)?;
        let record = Arc::new(record);
        let priority = priority.map(OfflinePriority::as_i64);

        let stamp = self.run("put_readable", move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r#"INSERT OR REPLACE INTO readable
                   (entry_id, content, title, byline, excerpt, source_url, image_urls, cover_url, cached_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                params![
                    record.entry_id,
                    record.content,
                    record.title,
                    record.byline,
                    record.excerpt,
                    record.source_url,
                    image_urls,
                    record.cover_url,
                    now,
                ],
            )?;
            tx.execute(
                r#"INSERT INTO meta (entry_id, priority, cached_at, last_accessed)
                   VALUES (?1, COALESCE(?2, 2), ?3, ?3)
                   ON CONFLICT(entry_id) DO UPDATE SET
                       priority = COALESCE(?2, meta.priority),
                       cached_at = excluded.cached_at,
                       last_accessed = excluded.last_accessed"#,
                params![record.entry_id, priority, now],
            )?;
            tx.commit()?;
            Ok(now)
        })
        .await?;
        self.readable_writes.fetch_add(1, Ordering::Relaxed);
        Ok(stamp)
    }

    pub async fn get_meta(&self, entry_id: i64) -> Result<Option<Meta>> {
        self.run("get_meta", move |conn| {
            conn.query_row(
                "SELECT entry_id, priority, cached_at, last_accessed FROM meta WHERE entry_id = ?1",
                params![entry_id],
                |row| {
                    Ok(Meta {
                        entry_id: row.get(0)?,
                        priority: OfflinePriority::from_i64(row.get(1)?),
                        cached_at: row.get(2)?,
                        last_accessed: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// Refresh `last_accessed`. Returns whether a meta row existed.
    pub async fn mark_access(&self, entry_id: i64) -> Result<bool> {
        let now = self.now_ms();
        let updated = self
            .run("mark_access", move |conn| {
                conn.execute(
                    "UPDATE meta SET last_accessed = ?1 WHERE entry_id = ?2",
                    params![now, entry_id],
                )
            })
            .await?;
        Ok(updated > 0)
    }

    // Image operations

    pub async fn get_image(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let url = url.to_string();
        self.run("get_image", move |conn| {
            conn.query_row(
                "SELECT data FROM image WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    pub async fn has_image(&self, url: &str) -> Result<bool> {
        let url = url.to_string();
        self.run("has_image", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM image WHERE url = ?1)",
                params![url],
                |row| row.get(0),
            )
        })
        .await
    }

    pub async fn put_image(&self, url: &str, data: Vec<u8>) -> Result<()> {
        let now = self.now_ms();
        let url = url.to_string();
        let data = Arc::new(data);
        self.run("put_image", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO image (url, data, cached_at) VALUES (?1, ?2, ?3)",
                params![url, data.as_slice(), now],
            )?;
            Ok(())
        })
        .await
    }

    // Summary operations

    pub async fn get_summary(&self, cache_key: &str) -> Result<Option<CachedSummary>> {
        let raw = self.get_payload("summary", cache_key).await?;
        raw.map(|raw| {
            let summary: Summary = serde_json::from_str(&raw.payload)?;
            Ok(CachedSummary {
                cache_key: raw.cache_key,
                entry_id: raw.entry_id,
                summary,
                cached_at: raw.cached_at,
            })
        })
        .transpose()
    }

    pub async fn put_summary(&self, cache_key: &str, entry_id: i64, summary: &Summary) -> Result<()> {
        let payload = serde_json::to_string(summary)?;
        self.put_payload("summary", cache_key, entry_id, payload).await
    }

    // Translation operations

    pub async fn get_translation(&self, cache_key: &str) -> Result<Option<CachedTranslation>> {
        let raw = self.get_payload("translation", cache_key).await?;
        raw.map(|raw| {
            let translation: Translation = serde_json::from_str(&raw.payload)?;
            Ok(CachedTranslation {
                cache_key: raw.cache_key,
                entry_id: raw.entry_id,
                translation,
                cached_at: raw.cached_at,
            })
        })
        .transpose()
    }

    pub async fn put_translation(
        &self,
        cache_key: &str,
        entry_id: i64,
        translation: &Translation,
    ) -> Result<()> {
        let payload = serde_json::to_string(translation)?;
        self.put_payload("translation", cache_key, entry_id, payload).await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.run("stats", |conn| {
            let count = |table: &str| -> rusqlite::Result<usize> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as usize)
            };
            Ok(CacheStats {
                readable: count("readable")?,
                meta: count("meta")?,
                image: count("image")?,
                summary: count("summary")?,
                translation: count("translation")?,
            })
        })
        .await
    }

    async fn get_payload(&self, table: &'static str, cache_key: &str) -> Result<Option<RawPayload>> {
        let cache_key = cache_key.to_string();
        self.run(table, move |conn| {
            conn.query_row(
                &format!("SELECT cache_key, entry_id, payload, cached_at FROM {table} WHERE cache_key = ?1"),
                params![cache_key],
                |row| {
                    Ok(RawPayload {
                        cache_key: row.get(0)?,
                        entry_id: row.get(1)?,
                        payload: row.get(2)?,
                        cached_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn put_payload(
        &self,
        table: &'static str,
        cache_key: &str,
        entry_id: i64,
        payload: String,
    ) -> Result<()> {
        let now = self.now_ms();
        let cache_key = cache_key.to_string();
        self.run(table, move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {table} (cache_key, entry_id, payload, cached_at) VALUES (?1, ?2, ?3, ?4)"
                ),
                params![cache_key, entry_id, payload, now],
            )?;
            Ok(())
        })
        .await
    }
}

fn raw_readable_from_row(row: &Row) -> rusqlite::Result<RawReadable> {
    Ok(RawReadable {
        readable: Readable {
            entry_id: row.get(0)?,
            content: row.get(1)?,
            title: row.get(2)?,
            byline: row.get(3)?,
            excerpt: row.get(4)?,
            source_url: row.get(5)?,
            image_urls: Vec::new(),
            cover_url: row.get(7)?,
            cached_at: row.get(8)?,
        },
        image_urls: row.get(6)?,
    })
}

fn decode_readable(raw: RawReadable) -> Result<Readable> {
    let mut readable = raw.readable;
    readable.image_urls = serde_json::from_str(&raw.image_urls)?;
    Ok(readable)
}
