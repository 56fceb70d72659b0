use rusqlite::{params, Connection, Transaction};

use crate::config::Budgets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetedTable {
    /// Readable rows, aged by their paired meta row.
    Readable,
    Image,
    Summary,
    Translation,
}

/// Primary key of a row picked for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionKey {
    Entry(i64),
    Key(String),
}

impl BudgetedTable {
    pub const ALL: [BudgetedTable; 4] = [
        BudgetedTable::Readable,
        BudgetedTable::Image,
        BudgetedTable::Summary,
        BudgetedTable::Translation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BudgetedTable::Readable => "readable",
            BudgetedTable::Image => "image",
            BudgetedTable::Summary => "summary",
            BudgetedTable::Translation => "translation",
        }
    }

    pub fn limit(self, budgets: &Budgets) -> usize {
        match self {
            BudgetedTable::Readable => budgets.readable,
            BudgetedTable::Image => budgets.image,
            BudgetedTable::Summary => budgets.summary,
            BudgetedTable::Translation => budgets.translation,
        }
    }

    /// `(key, age)` pairs, oldest first. `rowid` breaks ties in insertion order.
    fn oldest_first_sql(self) -> &'static str {
        match self {
            // Orphaned readable rows (no meta) age by their own cached_at.
            BudgetedTable::Readable => {
                r#"SELECT r.entry_id, COALESCE(m.last_accessed, r.cached_at) AS age
                   FROM readable r LEFT JOIN meta m ON m.entry_id = r.entry_id
                   ORDER BY age ASC, r.entry_id ASC"#
            }
            BudgetedTable::Image => "SELECT url, cached_at FROM image ORDER BY cached_at ASC, rowid ASC",
            BudgetedTable::Summary => {
                "SELECT cache_key, cached_at FROM summary ORDER BY cached_at ASC, rowid ASC"
            }
            BudgetedTable::Translation => {
                "SELECT cache_key, cached_at FROM translation ORDER BY cached_at ASC, rowid ASC"
            }
        }
    }
}

pub fn count_rows(conn: &Connection, table: BudgetedTable) -> rusqlite::Result<usize> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n.max(0) as usize)
}

/// Stream at most `quota` of the oldest keys in `table`. Read-only.
pub fn oldest_keys(
    conn: &Connection,
    table: BudgetedTable,
    quota: usize,
) -> rusqlite::Result<Vec<(EvictionKey, i64)>> {
    let mut stmt = conn.prepare(table.oldest_first_sql())?;
    let rows = stmt.query_map([], |row| {
        let key = match table {
            BudgetedTable::Readable => EvictionKey::Entry(row.get(0)?),
            _ => EvictionKey::Key(row.get(0)?),
        };
        Ok((key, row.get::<_, i64>(1)?))
    })?;
    let keys = rows.take(quota).collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(keys)
}

fn delete_key(tx: &Transaction, table: BudgetedTable, key: &EvictionKey) -> rusqlite::Result<usize> {
    match (table, key) {
        (BudgetedTable::Readable, EvictionKey::Entry(entry_id)) => {
            tx.execute("DELETE FROM meta WHERE entry_id = ?1", params![entry_id])?;
            tx.execute("DELETE FROM readable WHERE entry_id = ?1", params![entry_id])
        }
        (BudgetedTable::Image, EvictionKey::Key(url)) => {
            tx.execute("DELETE FROM image WHERE url = ?1", params![url])
        }
        (BudgetedTable::Summary | BudgetedTable::Translation, EvictionKey::Key(cache_key)) => tx
            .execute(
                &format!("DELETE FROM {} WHERE cache_key = ?1", table.name()),
                params![cache_key],
            ),
        _ => Ok(0),
    }
}

/// Bring `table` down to `limit` rows. Returns how many rows were evicted.
pub fn enforce(conn: &mut Connection, table: BudgetedTable, limit: usize) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let count = count_rows(&tx, table)?;
    if count <= limit {
        return Ok(0);
    }

    let quota = count - limit;
    let victims = oldest_keys(&tx, table, quota)?;
    let mut evicted = 0;
    for (key, _) in &victims {
        if evicted == quota {
            break;
        }
        if delete_key(&tx, table, key)? > 0 {
            evicted += 1;
        }
    }
    tx.commit()?;
    Ok(evicted)
}
