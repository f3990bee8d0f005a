//! Request-scoped cache facade
//!
//! A [`CacheScope`] bundles the memo, the invalidation gate and the
//! operator directive for one logical scope. Create one per request and drop
//! it when the request ends.

use std::sync::Arc;
use std::time::Duration;

use super::client::CacheClient;
use super::entry::CacheValue;
use super::gate::{GateOutcome, InvalidationDirective, InvalidationGate};
use super::memo::HitMemo;
use crate::composite::{BulkEdit, CommitLog, CompositeBuffer, TransactionError};

#[derive(Debug)]
pub struct CacheScope {
  memo: HitMemo,
  gate: Arc<InvalidationGate>,
  directive: Option<InvalidationDirective>,
  can_clear: bool,
  gate_ran: bool,
  commits: CommitLog,
}

impl CacheScope {
  pub fn new(client: CacheClient, gate: Arc<InvalidationGate>) -> Self {
    Self {
      memo: HitMemo::new(client),
      gate,
      directive: None,
      can_clear: false,
      gate_ran: false,
      commits: CommitLog::default(),
    }
  }

  pub fn with_directive(mut self, directive: Option<InvalidationDirective>) -> Self {
    self.directive = directive;
    self
  }

  /// Whether the caller may act on a directive. Without it the directive is
  /// ignored.
  pub fn with_can_clear(mut self, can_clear: bool) -> Self {
    self.can_clear = can_clear;
    self
  }

  pub fn client(&self) -> &CacheClient {
    self.memo.client()
  }

  pub fn memo(&mut self) -> &HitMemo {
    self.absorb_commits();
    &self.memo
  }

  /// Fold commits made by buffers from [`transaction`](Self::transaction)
  /// into the memo
  fn absorb_commits(&mut self) {
    let commits = std::mem::take(&mut *self.commits.lock());
    for (key, value) in commits {
      self.memo.record_write(&key, value);
    }
  }

  pub fn total_fetch_time(&self) -> Duration {
    self.memo.total_fetch_time()
  }

  /// Read `key`, serving repeats from the memo unless `no_cache` is set.
  ///
  /// The first read of the scope runs the pending directive, if any.
  pub async fn get_value(&mut self, key: &str, no_cache: bool) -> Option<CacheValue> {
    if !self.client().is_enabled() {
      return None;
    }
    self.absorb_commits();

    if !self.gate_ran {
      self.gate_ran = true;
      let directive = self.directive.take();
      if let Some(directive) = directive.filter(|_| self.can_clear) {
        let client = self.memo.client().clone();
        let outcome = self
          .gate
          .apply(&directive, key, &mut self.memo, &client)
          .await;
        if outcome == GateOutcome::ForceMiss {
          return None;
        }
      }
    }

    self.memo.get_or_fetch(key, no_cache).await
  }

  pub async fn cache_value(&mut self, key: &str, value: CacheValue, ttl: Duration) -> bool {
    self.absorb_commits();
    let written = self.client().set(key, value.clone(), ttl).await;
    if written {
      self.memo.record_write(key, value);
    }
    written
  }

  pub async fn replace_value(&mut self, key: &str, value: CacheValue, ttl: Duration) -> bool {
    self.absorb_commits();
    let replaced = self.client().replace(key, value.clone(), ttl).await;
    if replaced {
      self.memo.record_write(key, value);
    }
    replaced
  }

  pub async fn delete_value(&mut self, key: &str) -> bool {
    self.absorb_commits();
    self.memo.forget(key);
    self.client().delete(key).await
  }

  pub async fn expire_value(&mut self, key: &str, ttl: Duration) -> bool {
    self.client().expire(key, ttl).await
  }

  /// A fresh, idle transaction buffer on this scope's client. Its commits
  /// refresh this scope's memo.
  pub fn transaction(&self) -> CompositeBuffer {
    CompositeBuffer::with_commit_log(self.client().clone(), self.commits.clone())
  }

  /// Commit `buffer` and refresh this scope's memo with the written value,
  /// including buffers not issued by this scope
  pub async fn commit(
    &mut self,
    buffer: &mut CompositeBuffer,
    ttl: Duration,
  ) -> Result<(), TransactionError> {
    self.absorb_commits();
    let staged = buffer
      .key()
      .map(str::to_string)
      .zip(buffer.buffer().map(|b| b.to_cache_value()));
    buffer.commit(ttl).await?;
    self.absorb_commits();
    if let Some((key, value)) = staged {
      self.memo.record_write(&key, value);
    }
    Ok(())
  }

  /// One-shot `begin`, edit and `commit` of `key` that keeps the memo current
  pub async fn apply_and_commit(
    &mut self,
    key: &str,
    edit: &BulkEdit,
    ttl: Duration,
  ) -> Result<(), TransactionError> {
    let mut buffer = self.transaction();
    buffer.apply_and_commit(key, edit, ttl).await?;
    self.absorb_commits();
    Ok(())
  }
}
