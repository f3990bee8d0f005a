#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rowcache::cache::{
  CacheClient, CacheEntry, CacheStats, CacheStore, CacheStoreError, CacheValue, InMemoryCacheStore,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory store that counts every call and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
  inner: InMemoryCacheStore,
  pub gets: AtomicUsize,
  pub sets: AtomicUsize,
  pub replaces: AtomicUsize,
  pub deletes: AtomicUsize,
  pub fail_reads: AtomicBool,
  pub fail_writes: AtomicBool,
  written: Mutex<Vec<(String, CacheValue)>>,
  deleted: Mutex<Vec<String>>,
}

impl RecordingStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn gets(&self) -> usize {
    self.gets.load(Ordering::SeqCst)
  }

  pub fn sets(&self) -> usize {
    self.sets.load(Ordering::SeqCst)
  }

  pub fn replaces(&self) -> usize {
    self.replaces.load(Ordering::SeqCst)
  }

  pub fn deletes(&self) -> usize {
    self.deletes.load(Ordering::SeqCst)
  }

  pub fn calls(&self) -> usize {
    self.gets() + self.sets() + self.replaces() + self.deletes()
  }

  /// Every successful `set`, in order
  pub fn written(&self) -> Vec<(String, CacheValue)> {
    self.written.lock().clone()
  }

  pub fn deleted(&self) -> Vec<String> {
    self.deleted.lock().clone()
  }

  pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
    self.inner.ttl(key)
  }

  /// Seed a key without counting the call
  pub async fn seed(&self, key: &str, value: impl Into<CacheValue>) {
    let _ = self.inner.set(key, value.into(), None).await;
  }

  pub async fn peek(&self, key: &str) -> Option<CacheValue> {
    self.inner.get(key).await.ok().flatten().map(|e| e.value)
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  fn check(&self, flag: &AtomicBool) -> Result<(), CacheStoreError> {
    if flag.load(Ordering::SeqCst) {
      Err(CacheStoreError::Backend("connection refused".into()))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl CacheStore for RecordingStore {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheStoreError> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_reads)?;
    self.inner.get(key).await
  }

  async fn set(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<(), CacheStoreError> {
    self.sets.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_writes)?;
    self.written.lock().push((key.to_string(), value.clone()));
    self.inner.set(key, value, ttl).await
  }

  async fn replace(
    &self,
    key: &str,
    value: CacheValue,
    ttl: Option<Duration>,
  ) -> Result<bool, CacheStoreError> {
    self.replaces.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_writes)?;
    self.inner.replace(key, value, ttl).await
  }

  async fn delete(&self, key: &str) -> Result<bool, CacheStoreError> {
    self.deletes.fetch_add(1, Ordering::SeqCst);
    self.check(&self.fail_writes)?;
    self.deleted.lock().push(key.to_string());
    self.inner.delete(key).await
  }

  async fn info(&self) -> CacheStats {
    self.inner.info().await
  }
}

pub fn client_over(store: &Arc<RecordingStore>) -> CacheClient {
  CacheClient::new(store.clone())
}

pub fn json_value(v: Value) -> CacheValue {
  CacheValue::Json(v)
}
