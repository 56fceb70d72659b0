use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("persistent storage is not available")]
    StoreUnavailable,

    #[error("transient storage failure: {0}")]
    TransientIo(String),

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage permission denied: {0}")]
    PermissionDenied(String),

    #[error("corrupt cache record: {0}")]
    CorruptRecord(String),

    #[error("store schema version {found} is newer than supported version {supported}")]
    VersionConflict { found: i64, supported: i64 },

    #[error("store handle invalidated: {0}")]
    Invalidated(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Returns `false` for errors that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CacheError::QuotaExceeded
                | CacheError::PermissionDenied(_)
                | CacheError::StoreUnavailable
                | CacheError::VersionConflict { .. }
                | CacheError::CorruptRecord(_)
                | CacheError::Config(_)
        )
    }

    /// Whether the cached store handle must be dropped and reopened.
    pub fn invalidates_handle(&self) -> bool {
        matches!(
            self,
            CacheError::Invalidated(_) | CacheError::VersionConflict { .. }
        )
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::Utf8Error(_) => return CacheError::CorruptRecord(err.to_string()),
            _ => {}
        }

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy)
            | Some(ErrorCode::DatabaseLocked)
            | Some(ErrorCode::SystemIoFailure)
            | Some(ErrorCode::FileLockingProtocolFailed) => CacheError::TransientIo(err.to_string()),
            Some(ErrorCode::DiskFull) | Some(ErrorCode::TooBig) => CacheError::QuotaExceeded,
            Some(ErrorCode::PermissionDenied)
            | Some(ErrorCode::ReadOnly)
            | Some(ErrorCode::AuthorizationForStatementDenied) => {
                CacheError::PermissionDenied(err.to_string())
            }
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
                CacheError::CorruptRecord(err.to_string())
            }
            Some(ErrorCode::SchemaChanged) => CacheError::Invalidated(err.to_string()),
            Some(ErrorCode::CannotOpen) => CacheError::StoreUnavailable,
            _ => CacheError::TransientIo(err.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error> for CacheError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => e.into(),
            tokio_rusqlite::Error::ConnectionClosed => {
                CacheError::Invalidated("connection closed".to_string())
            }
            tokio_rusqlite::Error::Close((_, e)) => CacheError::Invalidated(e.to_string()),
            other => CacheError::TransientIo(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::CorruptRecord(err.to_string())
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Fetch(err.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}
