use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AI summary payload, stored as-is under an opaque cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    pub sentiment: String,
    #[serde(default)]
    pub questions: Vec<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSummary {
    pub cache_key: String,
    pub entry_id: i64,
    pub summary: Summary,
    pub cached_at: i64,
}
