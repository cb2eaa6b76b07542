//! # Key-Value Store
//!
//! The storage contract the allocator is written against. Values are JSON
//! documents addressed by string keys. `set_if_absent` must be atomic: it is
//! the primitive that keeps two reservations from claiming the same slot.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend did not answer; the operation may succeed if retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(#[from] eyre::Report),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Fetches several keys at once; the result is aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Value>>>;

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Writes `value` only when `key` is unset. Returns whether it was written.
    async fn set_if_absent(&self, key: &str, value: Value) -> StoreResult<bool>;

    /// Returns whether a value was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Keys starting with `prefix`, ascending.
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
