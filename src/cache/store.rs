//! Cache store trait and the builtin in-memory implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::entry::{CacheEntry, CacheValue};

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
  pub keys: usize,
  pub memory_used: usize,
  pub memory_limit: usize,
  pub hits: u64,
  pub misses: u64,
  pub expired: u64,
}

impl CacheStats {
  pub fn hit_rate(&self) -> f64 {
    let total = self.hits + self.misses;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }
}

/// Remote store capability consumed by [`CacheClient`](super::CacheClient).
///
/// Implementations report transport problems as `Err`; the client turns those
/// into misses and `false` results, so nothing here ever reaches a caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError>;
  async fn set(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<(), CacheStoreError>;
  /// Write only when `key` already exists. Returns whether a write happened.
  async fn replace(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<bool, CacheStoreError>;
  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError>;
  async fn info(&self) -> CacheStats;
}

/// Store operation error
#[derive(Debug, Clone)]
pub enum CacheStoreError {
  /// Connection, timeout or protocol failure in the backend
  Backend(String),
}

impl std::fmt::Display for CacheStoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheStoreError::Backend(msg) => write!(f, "Backend error: {}", msg),
    }
  }
}

impl std::error::Error for CacheStoreError {}

/// In-memory cache store implementation
pub struct InMemoryCacheStore {
  data: RwLock<HashMap<String, CacheEntry>>,
  default_ttl: Option<Duration>,
  hits: AtomicU64,
  misses: AtomicU64,
  expired: AtomicU64,
}

impl Default for InMemoryCacheStore {
  fn default() -> Self {
    Self::new(None)
  }
}

impl InMemoryCacheStore {
  pub fn new(default_ttl: Option<Duration>) -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      default_ttl,
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
      expired: AtomicU64::new(0),
    }
  }

  /// Check and evict expired entries
  pub fn evict_expired(&self) -> usize {
    let mut data = self.data.write();
    let before = data.len();
    data.retain(|_, entry| !entry.is_expired());
    let count = before - data.len();
    self.expired.fetch_add(count as u64, Ordering::Relaxed);
    count
  }

  /// Remaining lifetime of a live key. `None` when the key is absent,
  /// `Some(None)` when it never expires.
  pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
    let data = self.data.read();
    data
      .get(key)
      .filter(|e| !e.is_expired())
      .map(|e| e.ttl_remaining())
  }

  pub fn len(&self) -> usize {
    let data = self.data.read();
    data.values().filter(|e| !e.is_expired()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
    match ttl.or(self.default_ttl) {
      Some(d) if d.is_zero() => None,
      other => other,
    }
  }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
    let mut data = self.data.write();

    match data.get(key) {
      Some(entry) if entry.is_expired() => {
        data.remove(key);
        self.expired.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
      Some(entry) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.clone()))
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
    let entry = CacheEntry::new(key.to_string(), value.normalize(), self.effective_ttl(ttl));
    self.data.write().insert(key.to_string(), entry);
    Ok(())
  }

  async fn replace(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<bool, CacheStoreError> {
    let mut data = self.data.write();
    match data.get(key) {
      Some(entry) if !entry.is_expired() => {
        let entry = CacheEntry::new(key.to_string(), value.normalize(), self.effective_ttl(ttl));
        data.insert(key.to_string(), entry);
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
    let mut data = self.data.write();
    Ok(
      data
        .remove(key)
        .map(|entry| !entry.is_expired())
        .unwrap_or(false),
    )
  }

  async fn info(&self) -> CacheStats {
    self.evict_expired();
    let data = self.data.read();
    CacheStats {
      keys: data.len(),
      memory_used: data.values().map(CacheEntry::size).sum(),
      memory_limit: 0,
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      expired: self.expired.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_zero_ttl_never_expires() {
    let store = InMemoryCacheStore::new(Some(Duration::from_secs(60)));
    store.set("a", CacheValue::Integer(1), Some(Duration::ZERO)).await.unwrap();
    store.set("b", CacheValue::Integer(2), None).await.unwrap();

    assert_eq!(store.ttl("a"), Some(None));
    assert!(matches!(store.ttl("b"), Some(Some(d)) if d <= Duration::from_secs(60)));
    assert_eq!(store.ttl("c"), None);
  }

  #[tokio::test]
  async fn test_expired_entries_are_misses() {
    let store = InMemoryCacheStore::default();
    store
      .set("short", CacheValue::Integer(1), Some(Duration::from_millis(10)))
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(store.get("short").await.unwrap().is_none());
    assert!(!store.replace("short", CacheValue::Integer(2), None).await.unwrap());
    let stats = store.info().await;
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.misses, 1);
  }

  #[tokio::test]
  async fn test_info_evicts_expired_entries() {
    let store = InMemoryCacheStore::default();
    store
      .set("short", CacheValue::Integer(1), Some(Duration::from_millis(10)))
      .await
      .unwrap();
    store.set("long", CacheValue::Integer(2), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let stats = store.info().await;
    assert_eq!(stats.keys, 1);
    assert_eq!(stats.expired, 1);
    assert_eq!(store.data.read().len(), 1);
  }

  #[tokio::test]
  async fn test_json_scalars_read_back_like_redis() {
    let store = InMemoryCacheStore::default();
    store.set("s", CacheValue::Json(serde_json::json!("x")), None).await.unwrap();
    store.set("n", CacheValue::Json(serde_json::json!(5)), None).await.unwrap();
    assert!(store.replace("n", CacheValue::Json(serde_json::json!(6)), None).await.unwrap());

    assert_eq!(store.get("s").await.unwrap().map(|e| e.value), Some(CacheValue::String("x".into())));
    assert_eq!(store.get("n").await.unwrap().map(|e| e.value), Some(CacheValue::Integer(6)));
  }

  #[tokio::test]
  async fn test_hit_rate() {
    let store = InMemoryCacheStore::default();
    store.set("k", CacheValue::Integer(1), None).await.unwrap();
    store.get("k").await.unwrap();
    store.get("nope").await.unwrap();

    assert!((store.info().await.hit_rate() - 0.5).abs() < f64::EPSILON);
  }
}
