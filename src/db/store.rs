use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_rusqlite::Connection;

use crate::error::{CacheError, Result};

use super::schema::{migrate, PRAGMAS, SCHEMA_VERSION};

const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Where the cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// No persistent storage in this environment; every open fails.
    Disabled,
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    pub fn from_config(db_path: Option<&str>) -> Self {
        match db_path.map(str::trim) {
            None | Some("") => StoreLocation::Disabled,
            Some(":memory:") => StoreLocation::Memory,
            Some(path) => StoreLocation::File(PathBuf::from(path)),
        }
    }
}

/// Owns the single store handle.
///
/// The handle is opened lazily and shared by every caller. When an operation
/// reports that the handle went stale (closed connection, schema changed under
/// us) it is dropped here and the next caller opens a fresh one.
pub struct StoreManager {
    location: StoreLocation,
    handle: Mutex<Option<Connection>>,
}

impl StoreManager {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            handle: Mutex::new(None),
        }
    }

    pub async fn handle(&self) -> Result<Connection> {
        let mut guard = self.handle.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.open().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    pub async fn is_open(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Drop the cached handle so the next caller reopens the store.
    pub async fn invalidate(&self) {
        if self.handle.lock().await.take().is_some() {
            tracing::debug!("Discarded offline cache store handle");
        }
    }

    /// Run `function` on the store's connection thread.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.handle().await?;
        match conn
            .call(move |conn| function(conn).map_err(tokio_rusqlite::Error::from))
            .await
        {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = CacheError::from(e);
                if err.invalidates_handle() {
                    tracing::warn!(error = %err, "Offline cache store handle went stale");
                    self.invalidate().await;
                }
                Err(err)
            }
        }
    }

    async fn open(&self) -> Result<Connection> {
        let conn = match &self.location {
            StoreLocation::Disabled => return Err(CacheError::StoreUnavailable),
            StoreLocation::Memory => Connection::open_in_memory().await?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!("Cannot create cache directory {:?}: {}", parent, e);
                        return Err(CacheError::StoreUnavailable);
                    }
                }
                Connection::open(path).await?
            }
        };

        let found = conn
            .call(|conn| {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn.execute_batch(PRAGMAS)?;
                Ok(migrate(conn)?)
            })
            .await?;

        if found > SCHEMA_VERSION {
            return Err(CacheError::VersionConflict {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        tracing::debug!(location = ?self.location, "Opened offline cache store");
        Ok(conn)
    }
}
