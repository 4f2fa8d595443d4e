//! Redis-backed cache provider. Values are stored as JSON.

use super::{record_key, set_key, CacheProvider};
use crate::error::{OrmError, Result};
use crate::value::FieldMap;
use redis::Commands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// # Errors
    ///
    /// Returns `OrmError::Cache` when the URL is malformed.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| OrmError::Cache(e.to_string()))?;
        Ok(Self { client })
    }

    fn connection(&self) -> Result<redis::Connection> {
        self.client
            .get_connection()
            .map_err(|e| OrmError::Cache(format!("redis connection failed: {e}")))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection()?;
        let raw: Option<String> = conn.get(key).map_err(|e| OrmError::Cache(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| OrmError::Cache(format!("corrupt cache entry {key}: {e}"))),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let json = serde_json::to_string(value).map_err(|e| OrmError::Cache(e.to_string()))?;
        let mut conn = self.connection()?;
        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(key, json, ttl.as_secs().max(1)),
            None => conn.set(key, json),
        };
        result.map_err(|e| OrmError::Cache(e.to_string()))
    }
}

impl CacheProvider for RedisCache {
    fn get_record(&self, kind: &str, id: i64) -> Result<Option<FieldMap>> {
        self.read(&record_key(kind, id))
    }

    fn get_record_set(&self, kind: &str, key: &str) -> Result<Option<Vec<i64>>> {
        self.read(&set_key(kind, key))
    }

    fn store_record(&self, kind: &str, id: i64, fields: &FieldMap, ttl: Option<Duration>) -> Result<()> {
        self.write(&record_key(kind, id), fields, ttl)
    }

    fn store_record_set(&self, kind: &str, key: &str, ids: &[i64], ttl: Option<Duration>) -> Result<()> {
        self.write(&set_key(kind, key), ids, ttl)
    }
}
