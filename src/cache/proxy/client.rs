//! Redis proxy client for connecting to external Redis servers

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::cache::config::CacheProxyConfig;
use crate::cache::entry::{CacheEntry, CacheValue};
use crate::cache::store::{CacheStats, CacheStore, CacheStoreError};

/// Redis proxy client that connects to external Redis servers
pub struct RedisProxyClient {
  connection: ConnectionManager,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl RedisProxyClient {
  /// Create a new Redis proxy client from configuration
  pub async fn new(config: &CacheProxyConfig) -> Result<Self, RedisError> {
    let client = Client::open(config.connection_url())?;
    let connection = ConnectionManager::new(client).await?;

    Ok(Self {
      connection,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    })
  }

  /// Test the connection to Redis
  pub async fn test_connection(&self) -> Result<(), RedisError> {
    let mut conn = self.connection.clone();
    redis::cmd("PING").query_async::<()>(&mut conn).await?;
    Ok(())
  }

  /// `SET` arguments for an optional TTL. Sub-second lifetimes round up so
  /// they never turn into "no expiry".
  fn expiry_secs(ttl: Option<Duration>) -> Option<u64> {
    ttl.filter(|d| !d.is_zero()).map(|d| {
      let secs = d.as_secs();
      if d.subsec_nanos() > 0 {
        secs + 1
      } else {
        secs
      }
    })
  }
}

fn backend_error(e: RedisError) -> CacheStoreError {
  CacheStoreError::Backend(e.to_string())
}

#[async_trait]
impl CacheStore for RedisProxyClient {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
    let mut conn = self.connection.clone();

    let bytes: Option<Vec<u8>> = conn.get(key).await.map_err(|e| {
      self.misses.fetch_add(1, Ordering::Relaxed);
      backend_error(e)
    })?;

    match bytes {
      Some(bytes) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let value = CacheValue::from_bytes(&bytes);
        Ok(Some(CacheEntry::new(key.to_string(), value, None)))
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn set(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<(), CacheStoreError> {
    let mut conn = self.connection.clone();
    let serialized = value.to_bytes();

    let result: Result<(), RedisError> = match Self::expiry_secs(ttl) {
      Some(secs) => conn.set_ex(key, serialized, secs).await,
      None => conn.set(key, serialized).await,
    };

    result.map_err(backend_error)
  }

  async fn replace(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<bool, CacheStoreError> {
    let mut conn = self.connection.clone();

    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value.to_bytes());
    if let Some(secs) = Self::expiry_secs(ttl) {
      cmd.arg("EX").arg(secs);
    }
    cmd.arg("XX");

    // nil reply means the key did not exist
    let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(backend_error)?;
    Ok(reply.is_some())
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
    let mut conn = self.connection.clone();
    let removed: i64 = conn.del(key).await.map_err(backend_error)?;
    Ok(removed > 0)
  }

  async fn info(&self) -> CacheStats {
    let mut conn = self.connection.clone();

    let info: Result<String, _> = redis::cmd("INFO").query_async(&mut conn).await;
    let dbsize: Result<usize, _> = redis::cmd("DBSIZE").query_async(&mut conn).await;

    let mut memory_used = 0usize;
    let mut memory_limit = 0usize;
    let mut expired = 0u64;

    if let Ok(info_str) = info {
      for line in info_str.lines() {
        if let Some(val) = line.strip_prefix("used_memory:") {
          memory_used = val.trim().parse().unwrap_or(0);
        } else if let Some(val) = line.strip_prefix("maxmemory:") {
          memory_limit = val.trim().parse().unwrap_or(0);
        } else if let Some(val) = line.strip_prefix("expired_keys:") {
          expired = val.trim().parse().unwrap_or(0);
        }
      }
    }

    CacheStats {
      keys: dbsize.unwrap_or(0),
      memory_used,
      memory_limit,
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expired,
    }
  }
}
