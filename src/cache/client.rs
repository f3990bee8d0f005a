//! Soft-failing cache client
//!
//! Wraps a [`CacheStore`] by composition. Every failure is logged and turned
//! into a miss or a `false`, because the cache is an optimization layer and
//! never the source of truth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::{CacheConfig, DEFAULT_TTL};
use super::entry::CacheValue;
use super::metrics::{CacheOp, LatencySink, NoopSink};
use super::store::{CacheStats, CacheStore};

struct ClientInner {
  store: Arc<dyn CacheStore>,
  sink: Arc<dyn LatencySink>,
  enabled: AtomicBool,
  memo: AtomicBool,
  default_ttl: Duration,
}

/// Cheap to clone; clones share the store, the sink and both switches.
#[derive(Clone)]
pub struct CacheClient {
  inner: Arc<ClientInner>,
}

impl std::fmt::Debug for CacheClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CacheClient")
      .field("enabled", &self.is_enabled())
      .field("memo", &self.memo_enabled())
      .field("default_ttl", &self.inner.default_ttl)
      .finish()
  }
}

impl CacheClient {
  pub fn new(store: Arc<dyn CacheStore>) -> Self {
    Self::with_sink(store, Arc::new(NoopSink))
  }

  pub fn with_sink(store: Arc<dyn CacheStore>, sink: Arc<dyn LatencySink>) -> Self {
    Self::build(store, sink, true, true, DEFAULT_TTL)
  }

  pub fn from_config(
    store: Arc<dyn CacheStore>,
    sink: Arc<dyn LatencySink>,
    config: &CacheConfig,
  ) -> Self {
    Self::build(
      store,
      sink,
      config.enabled,
      config.memo,
      config.default_ttl(),
    )
  }

  fn build(
    store: Arc<dyn CacheStore>,
    sink: Arc<dyn LatencySink>,
    enabled: bool,
    memo: bool,
    default_ttl: Duration,
  ) -> Self {
    Self {
      inner: Arc::new(ClientInner {
        store,
        sink,
        enabled: AtomicBool::new(enabled),
        memo: AtomicBool::new(memo),
        default_ttl,
      }),
    }
  }

  pub fn enable(&self) {
    self.inner.enabled.store(true, Ordering::Relaxed);
  }

  pub fn disable(&self) {
    self.inner.enabled.store(false, Ordering::Relaxed);
  }

  pub fn is_enabled(&self) -> bool {
    self.inner.enabled.load(Ordering::Relaxed)
  }

  pub fn enable_memo(&self) {
    self.inner.memo.store(true, Ordering::Relaxed);
  }

  pub fn disable_memo(&self) {
    self.inner.memo.store(false, Ordering::Relaxed);
  }

  pub fn memo_enabled(&self) -> bool {
    self.inner.memo.load(Ordering::Relaxed)
  }

  pub fn default_ttl(&self) -> Duration {
    self.inner.default_ttl
  }

  fn record(&self, op: CacheOp, started: Instant) {
    self.inner.sink.record(op, started.elapsed());
  }

  fn key_is_usable(&self, op: CacheOp, key: &str) -> bool {
    if key.is_empty() {
      tracing::warn!(%op, "cache {} called with an empty key", op);
      return false;
    }
    true
  }

  /// Best-effort read; failures are misses
  pub async fn get(&self, key: &str) -> Option<CacheValue> {
    if !self.is_enabled() || !self.key_is_usable(CacheOp::Get, key) {
      return None;
    }

    let started = Instant::now();
    let result = self.inner.store.get(key).await;
    self.record(CacheOp::Get, started);

    match result {
      Ok(entry) => entry.map(|e| e.value),
      Err(e) => {
        tracing::debug!(key, "cache read failed, treating as miss: {}", e);
        None
      }
    }
  }

  /// Unconditional write with expiry
  pub async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> bool {
    if !self.is_enabled() || !self.key_is_usable(CacheOp::Set, key) {
      return false;
    }

    let started = Instant::now();
    let result = self.inner.store.set(key, value, Some(ttl)).await;
    self.record(CacheOp::Set, started);

    match result {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(key, "cache insert failed: {}", e);
        false
      }
    }
  }

  /// Write only when the key already exists
  pub async fn replace(&self, key: &str, value: CacheValue, ttl: Duration) -> bool {
    if !self.is_enabled() || !self.key_is_usable(CacheOp::Replace, key) {
      return false;
    }

    let started = Instant::now();
    let result = self.inner.store.replace(key, value, Some(ttl)).await;
    self.record(CacheOp::Replace, started);

    match result {
      Ok(replaced) => replaced,
      Err(e) => {
        tracing::warn!(key, "cache replace failed: {}", e);
        false
      }
    }
  }

  /// Best-effort remove; an absent key just returns false
  pub async fn delete(&self, key: &str) -> bool {
    if !self.is_enabled() || !self.key_is_usable(CacheOp::Delete, key) {
      return false;
    }

    let started = Instant::now();
    let result = self.inner.store.delete(key).await;
    self.record(CacheOp::Delete, started);

    match result {
      Ok(removed) => removed,
      Err(e) => {
        tracing::warn!(key, "cache delete failed: {}", e);
        false
      }
    }
  }

  /// Re-write the current value with a new lifetime, leaving content alone.
  /// Absent keys are not created.
  pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
    if !self.is_enabled() || !self.key_is_usable(CacheOp::Expire, key) {
      return false;
    }

    let started = Instant::now();
    let current = match self.inner.store.get(key).await {
      Ok(Some(entry)) => entry.value,
      Ok(None) => {
        self.record(CacheOp::Expire, started);
        return false;
      }
      Err(e) => {
        self.record(CacheOp::Expire, started);
        tracing::debug!(key, "cache expire read failed: {}", e);
        return false;
      }
    };
    let result = self.inner.store.set(key, current, Some(ttl)).await;
    self.record(CacheOp::Expire, started);

    match result {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(key, "cache expire write failed: {}", e);
        false
      }
    }
  }

  pub async fn stats(&self) -> Option<CacheStats> {
    if !self.is_enabled() {
      return None;
    }

    let started = Instant::now();
    let stats = self.inner.store.info().await;
    self.record(CacheOp::Stats, started);
    Some(stats)
  }
}
