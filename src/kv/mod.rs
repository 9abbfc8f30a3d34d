//! Key-value store primitives used by the distributed registry backend.
//!
//! The registry and the snapshot cache only need a handful of operations
//! from a networked store:
//! - plain values with an optional expiry
//! - unordered string sets
//! - cursor-based key scans filtered by a glob pattern
//!
//! [`MemoryKvStore`] implements the same semantics in process. Keys holding
//! sets disappear once their last member is removed, and expired values are
//! invisible to every operation, scans included. With the `redis-store`
//! feature, `RedisKvStore` speaks to a Redis server.

mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use memory::MemoryKvStore;
#[cfg(feature = "redis-store")]
pub use redis_store::{RedisKvStore, DEFAULT_CONNECT_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a key-value store.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KvError {
    /// The store could not be reached or the command was not executed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value command hit a set key or vice versa.
    #[error("wrong value type at key {0}")]
    WrongType(String),
}

/// One page of a key scan.
#[derive(Clone, Debug, Default)]
pub struct ScanPage {
    /// Cursor for the next call. `0` once the scan is complete.
    pub cursor: u64,
    /// Keys matching the pattern in this page.
    pub keys: Vec<String>,
}

/// Default page size requested by scans.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Networked key-value store interface.
pub trait KvStore: Send + Sync {
    /// Read a plain value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Read several plain values. Missing keys yield `None` at their position.
    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError>;

    /// Write a plain value, replacing any previous value and expiry.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Delete keys of any type. Returns the number of keys removed.
    fn del(&self, keys: &[String]) -> Result<usize, KvError>;

    /// Whether a key of any type exists.
    fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Add members to a set. Returns the number of members newly added.
    fn sadd(&self, key: &str, members: &[String]) -> Result<usize, KvError>;

    /// Remove members from a set. Returns the number of members removed.
    fn srem(&self, key: &str, members: &[String]) -> Result<usize, KvError>;

    /// All members of a set; empty if the key does not exist.
    fn smembers(&self, key: &str) -> Result<Vec<String>, KvError>;

    /// Scan keys matching a glob pattern. Start with cursor `0`.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, KvError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key)
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, KvError> {
        (**self).mget(keys)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), KvError> {
        (**self).set(key, value, ttl)
    }

    fn del(&self, keys: &[String]) -> Result<usize, KvError> {
        (**self).del(keys)
    }

    fn exists(&self, key: &str) -> Result<bool, KvError> {
        (**self).exists(key)
    }

    fn sadd(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        (**self).sadd(key, members)
    }

    fn srem(&self, key: &str, members: &[String]) -> Result<usize, KvError> {
        (**self).srem(key, members)
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>, KvError> {
        (**self).smembers(key)
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, KvError> {
        (**self).scan(cursor, pattern, count)
    }
}

/// Run a scan to completion, collecting every matching key.
pub fn scan_all<S: KvStore + ?Sized>(store: &S, pattern: &str) -> Result<Vec<String>, KvError> {
    let mut cursor = 0;
    let mut keys = Vec::new();
    loop {
        let page = store.scan(cursor, pattern, DEFAULT_SCAN_COUNT)?;
        keys.extend(page.keys);
        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys)
}

/// Count keys matching a pattern without holding them all at once.
pub fn scan_count<S: KvStore + ?Sized>(store: &S, pattern: &str) -> Result<usize, KvError> {
    let mut cursor = 0;
    let mut count = 0;
    loop {
        let page = store.scan(cursor, pattern, DEFAULT_SCAN_COUNT)?;
        count += page.keys.len();
        cursor = page.cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(count)
}
