use std::collections::HashSet;

use rusqlite::{params, Connection, Transaction};

/// Rows deleted per table by one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub readable: usize,
    pub meta: usize,
    pub image: usize,
    pub summary: usize,
    pub translation: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.readable + self.meta + self.image + self.summary + self.translation
    }
}

/// Owning entry id embedded in an AI cache key (`kind:entryId:...`).
pub fn entry_id_from_cache_key(cache_key: &str) -> Option<i64> {
    cache_key.split(':').nth(1)?.trim().parse().ok()
}

pub fn prune(conn: &mut Connection, keep: &HashSet<i64>) -> rusqlite::Result<PruneReport> {
    let tx = conn.transaction()?;
    let retained_images = retained_image_urls(&tx, keep)?;

    let report = PruneReport {
        readable: prune_entries(&tx, "readable", keep)?,
        meta: prune_entries(&tx, "meta", keep)?,
        image: prune_images(&tx, &retained_images)?,
        summary: prune_keyed(&tx, "summary", keep)?,
        translation: prune_keyed(&tx, "translation", keep)?,
    };

    tx.commit()?;
    Ok(report)
}

/// Union of `image_urls` and `cover_url` over the retained readable rows.
fn retained_image_urls(tx: &Transaction, keep: &HashSet<i64>) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = tx.prepare("SELECT entry_id, image_urls, cover_url FROM readable")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut urls = HashSet::new();
    for row in rows {
        let (entry_id, image_urls, cover_url) = row?;
        if !keep.contains(&entry_id) {
            continue;
        }
        match serde_json::from_str::<Vec<String>>(&image_urls) {
            Ok(list) => urls.extend(list),
            Err(e) => tracing::warn!(entry_id, "Skipping unreadable image list: {}", e),
        }
        urls.extend(cover_url);
    }
    Ok(urls)
}

fn prune_entries(tx: &Transaction, table: &str, keep: &HashSet<i64>) -> rusqlite::Result<usize> {
    let doomed = {
        let mut stmt = tx.prepare(&format!("SELECT entry_id FROM {table}"))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .filter(|id| id.as_ref().map_or(true, |id| !keep.contains(id)))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };

    let sql = format!("DELETE FROM {table} WHERE entry_id = ?1");
    let mut deleted = 0;
    for entry_id in doomed {
        deleted += tx.execute(&sql, params![entry_id])?;
    }
    Ok(deleted)
}

fn prune_images(tx: &Transaction, retained: &HashSet<String>) -> rusqlite::Result<usize> {
    let doomed = {
        let mut stmt = tx.prepare("SELECT url FROM image")?;
        let urls = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter(|url| url.as_ref().map_or(true, |url| !retained.contains(url)))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        urls
    };

    let mut deleted = 0;
    for url in doomed {
        deleted += tx.execute("DELETE FROM image WHERE url = ?1", params![url])?;
    }
    Ok(deleted)
}

/// Summary/translation rows; the owner comes from the key, falling back to the
/// stored `entry_id` when the key does not carry one.
fn prune_keyed(tx: &Transaction, table: &str, keep: &HashSet<i64>) -> rusqlite::Result<usize> {
    let doomed = {
        let mut stmt = tx.prepare(&format!("SELECT cache_key, entry_id FROM {table}"))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut doomed = Vec::new();
        for row in rows {
            let (cache_key, stored_entry_id) = row?;
            let owner = entry_id_from_cache_key(&cache_key).unwrap_or(stored_entry_id);
            if !keep.contains(&owner) {
                doomed.push(cache_key);
            }
        }
        doomed
    };

    let sql = format!("DELETE FROM {table} WHERE cache_key = ?1");
    let mut deleted = 0;
    for cache_key in doomed {
        deleted += tx.execute(&sql, params![cache_key])?;
    }
    Ok(deleted)
}
