mod repository;
pub mod retry;
pub mod schema;
mod store;

pub use repository::{CacheStats, Repository};
pub use retry::{with_retry, RetryPolicy};
pub use schema::SCHEMA_VERSION;
pub use store::{StoreLocation, StoreManager};
