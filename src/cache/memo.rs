//! Per-scope hit memoization
//!
//! A [`HitMemo`] lives for one logical scope (usually one request). Reads of
//! a key already seen in the scope are answered locally. The memo never
//! observes writes made by other processes, so it must not outlive its
//! scope.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::client::CacheClient;
use super::entry::CacheValue;

/// A value served from the remote store during this scope
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
  pub value: CacheValue,
  pub fetch_time: Duration,
}

#[derive(Debug)]
pub struct HitMemo {
  client: CacheClient,
  hits: HashMap<String, HitRecord>,
  total_fetch_time: Duration,
}

impl HitMemo {
  pub fn new(client: CacheClient) -> Self {
    Self {
      client,
      hits: HashMap::new(),
      total_fetch_time: Duration::ZERO,
    }
  }

  pub fn client(&self) -> &CacheClient {
    &self.client
  }

  /// Serve `key` from the memo, or fetch it and remember the hit.
  ///
  /// With `bypass_memo` the remote store is always read and the result is
  /// not recorded.
  pub async fn get_or_fetch(&mut self, key: &str, bypass_memo: bool) -> Option<CacheValue> {
    if !self.client.is_enabled() {
      return None;
    }

    if !bypass_memo {
      if let Some(record) = self.hits.get(key) {
        return Some(record.value.clone());
      }
    }

    let started = Instant::now();
    let value = self.client.get(key).await?;

    if !bypass_memo && self.client.memo_enabled() {
      let fetch_time = started.elapsed();
      self.total_fetch_time += fetch_time;
      self.hits.insert(
        key.to_string(),
        HitRecord {
          value: value.clone(),
          fetch_time,
        },
      );
    }

    Some(value)
  }

  /// Refresh a memoized value after this scope wrote `key` itself
  pub fn record_write(&mut self, key: &str, value: CacheValue) {
    if let Some(record) = self.hits.get_mut(key) {
      record.value = value.normalize();
    }
  }

  /// Drop a single record. Returns whether one existed.
  pub fn forget(&mut self, key: &str) -> bool {
    self.hits.remove(key).is_some()
  }

  pub fn clear(&mut self) {
    self.hits.clear();
  }

  pub fn contains(&self, key: &str) -> bool {
    self.hits.contains_key(key)
  }

  pub fn get(&self, key: &str) -> Option<&HitRecord> {
    self.hits.get(key)
  }

  pub fn keys(&self) -> Vec<String> {
    self.hits.keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.hits.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hits.is_empty()
  }

  /// Latency recorded for one hit
  pub fn fetch_time(&self, key: &str) -> Option<Duration> {
    self.hits.get(key).map(|r| r.fetch_time)
  }

  /// Sum of every fetch recorded in this scope, including evicted ones
  pub fn total_fetch_time(&self) -> Duration {
    self.total_fetch_time
  }
}
