use rusqlite::Connection;

/// Bumped whenever a migration step is appended to `migrate`.
pub const SCHEMA_VERSION: i64 = 2;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
"#;

pub const SCHEMA: &str = r#"
-- readable (extracted article content)
CREATE TABLE IF NOT EXISTS readable (
    entry_id INTEGER PRIMARY KEY,
    content TEXT NOT NULL,
    title TEXT,
    byline TEXT,
    excerpt TEXT,
    source_url TEXT,
    image_urls TEXT NOT NULL DEFAULT '[]',
    cached_at INTEGER NOT NULL
);

-- meta (access metadata, one row per readable row)
CREATE TABLE IF NOT EXISTS meta (
    entry_id INTEGER PRIMARY KEY,
    priority INTEGER NOT NULL DEFAULT 2,
    cached_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_meta_last_accessed ON meta(last_accessed);

-- image (binary payloads keyed by absolute URL)
CREATE TABLE IF NOT EXISTS image (
    url TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_image_cached_at ON image(cached_at);

-- translation (AI translation payloads)
CREATE TABLE IF NOT EXISTS translation (
    cache_key TEXT PRIMARY KEY,
    entry_id INTEGER NOT NULL,
    payload TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_translation_cached_at ON translation(cached_at);

-- summary (AI summary payloads)
CREATE TABLE IF NOT EXISTS summary (
    cache_key TEXT PRIMARY KEY,
    entry_id INTEGER NOT NULL,
    payload TEXT NOT NULL,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summary_cached_at ON summary(cached_at);
"#;

/// Brings the store up to `SCHEMA_VERSION` and returns the version found on disk.
///
/// Every step only creates what is missing, so a store left half-migrated by an
/// interrupted upgrade is healed on the next open. A store that is already newer
/// than this build is left untouched; the caller decides what to do with it.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<i64> {
    let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Ok(found);
    }

    let tx = conn.transaction()?;

    // v1: the five tables and their secondary indexes
    tx.execute_batch(SCHEMA)?;

    // v2: explicit cover image for pruning
    if !has_column(&tx, "readable", "cover_url")? {
        tx.execute("ALTER TABLE readable ADD COLUMN cover_url TEXT", [])?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    if found < SCHEMA_VERSION {
        tracing::info!(from = found, to = SCHEMA_VERSION, "Migrated offline cache schema");
    }
    Ok(found)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name == column))
}
