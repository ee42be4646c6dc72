//! Page cache
//!
//! A key-value store mapping feed URLs (and the reserved index key) to rendered
//! [`Page`]s. The engine depends only on the [`PageCache`] contract:
//!
//! - `get` distinguishes a missing entry (`Ok(None)`) from a store failure.
//! - `set` overwrites unconditionally; it is atomic per key.
//! - `replace_all` publishes a whole rebuild [`Generation`] at once. Readers
//!   observe either the previous contents or the new generation, never an empty
//!   or partially written store.
//!
//! Implementations serialize their own concurrent access; callers never lock.
//!
//! ## Backends
//!
//! - [`MemoryPageCache`]: in-process map behind a copy-on-write `Arc`.
//! - `infra::db::SqlitePageCache`: durable table, `replace_all` runs in one
//!   transaction.

mod generation;
pub(crate) mod lock;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CacheKey, Page};

pub use generation::Generation;
pub use memory::MemoryPageCache;

pub(crate) const METRIC_CACHE_HIT: &str = "podfeeds_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "podfeeds_cache_miss_total";
pub(crate) const METRIC_CACHE_WRITE: &str = "podfeeds_cache_write_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage failure during `{op}`: {message}")]
    Storage { op: &'static str, message: String },
    #[error("cached entry `{key}` is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

impl CacheError {
    pub fn storage(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            op,
            message: err.to_string(),
        }
    }

    pub fn corrupt(key: &CacheKey, err: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Page>, CacheError>;

    async fn set(&self, key: &CacheKey, page: Page) -> Result<(), CacheError>;

    async fn erase(&self, key: &CacheKey) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Atomically replace every entry with the contents of `generation`.
    async fn replace_all(&self, generation: Generation) -> Result<(), CacheError>;
}
