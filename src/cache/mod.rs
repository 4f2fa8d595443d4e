//! Pluggable result caches.
//!
//! A cache provider stores materialized rows by `(kind, id)` and id lists by
//! `(kind, key)`. Entities and collections push into the provider attached to
//! their registry; `Kind::load_from_cache` and `Kind::load_cached_set` read back.

#[cfg(feature = "redis-cache")]
mod redis_cache;

#[cfg(feature = "redis-cache")]
pub use redis_cache::RedisCache;

use crate::error::Result;
use crate::value::FieldMap;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Storage for cached rows and id lists
pub trait CacheProvider: Send + Sync {
    /// Cached field map of one row
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Cache` when the backend fails.
    fn get_record(&self, kind: &str, id: i64) -> Result<Option<FieldMap>>;

    /// Cached id list stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Cache` when the backend fails.
    fn get_record_set(&self, kind: &str, key: &str) -> Result<Option<Vec<i64>>>;

    /// # Errors
    ///
    /// Returns `OrmError::Cache` when the backend fails.
    fn store_record(&self, kind: &str, id: i64, fields: &FieldMap, ttl: Option<Duration>) -> Result<()>;

    /// # Errors
    ///
    /// Returns `OrmError::Cache` when the backend fails.
    fn store_record_set(&self, kind: &str, key: &str, ids: &[i64], ttl: Option<Duration>) -> Result<()>;
}

pub(crate) fn record_key(kind: &str, id: i64) -> String {
    format!("rowguard:record:{kind}:{id}")
}

pub(crate) fn set_key(kind: &str, key: &str) -> String {
    format!("rowguard:set:{kind}:{key}")
}

#[derive(Debug, Clone)]
enum Entry {
    Record(FieldMap),
    Set(Vec<i64>),
}

/// In-process cache with per-entry expiry
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Entry, Option<Instant>)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn get(&self, key: &str) -> Option<Entry> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(slot) => match slot.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Some(slot.0.clone()),
            },
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn put(&self, key: String, entry: Entry, ttl: Option<Duration>) {
        let deadline = ttl.map(|t| Instant::now() + t);
        self.entries.insert(key, (entry, deadline));
    }
}

impl CacheProvider for MemoryCache {
    fn get_record(&self, kind: &str, id: i64) -> Result<Option<FieldMap>> {
        Ok(match self.get(&record_key(kind, id)) {
            Some(Entry::Record(fields)) => Some(fields),
            _ => None,
        })
    }

    fn get_record_set(&self, kind: &str, key: &str) -> Result<Option<Vec<i64>>> {
        Ok(match self.get(&set_key(kind, key)) {
            Some(Entry::Set(ids)) => Some(ids),
            _ => None,
        })
    }

    fn store_record(&self, kind: &str, id: i64, fields: &FieldMap, ttl: Option<Duration>) -> Result<()> {
        self.put(record_key(kind, id), Entry::Record(fields.clone()), ttl);
        Ok(())
    }

    fn store_record_set(&self, kind: &str, key: &str, ids: &[i64], ttl: Option<Duration>) -> Result<()> {
        self.put(set_key(kind, key), Entry::Set(ids.to_vec()), ttl);
        Ok(())
    }
}
