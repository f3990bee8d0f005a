//! Staged begin/edit/commit transactions on one composite cache value
//!
//! No lock is taken on the remote key between `begin` and `commit`. Two
//! processes staging the same key race, and the last commit wins.

use parking_lot::Mutex;
use serde_json::{Number, Value};
use std::sync::Arc;
use std::time::Duration;

use super::error::TransactionError;
use super::value::{BulkEdit, CompositeValue, FieldEdit, RowKey, RowSelector};
use crate::cache::{CacheClient, CacheValue};

/// Values written by successful commits, drained by the scope that issued
/// the buffer
pub(crate) type CommitLog = Arc<Mutex<Vec<(String, CacheValue)>>>;

#[derive(Debug)]
struct TransactionState {
  key: String,
  buffer: CompositeValue,
}

/// Working copy of one composite value.
///
/// `Idle` until [`begin`](Self::begin) succeeds, `Active` until
/// [`commit`](Self::commit) or [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct CompositeBuffer {
  client: CacheClient,
  state: Option<TransactionState>,
  commits: Option<CommitLog>,
}

impl CompositeBuffer {
  pub fn new(client: CacheClient) -> Self {
    Self {
      client,
      state: None,
      commits: None,
    }
  }

  pub(crate) fn with_commit_log(client: CacheClient, commits: CommitLog) -> Self {
    Self {
      client,
      state: None,
      commits: Some(commits),
    }
  }

  pub fn is_active(&self) -> bool {
    self.state.is_some()
  }

  /// Key of the active transaction
  pub fn key(&self) -> Option<&str> {
    self.state.as_ref().map(|s| s.key.as_str())
  }

  /// Staged value of the active transaction
  pub fn buffer(&self) -> Option<&CompositeValue> {
    self.state.as_ref().map(|s| &s.buffer)
  }

  fn ensure_enabled(&self) -> Result<(), TransactionError> {
    if self.client.is_enabled() {
      Ok(())
    } else {
      Err(TransactionError::Disabled)
    }
  }

  /// Load `key` into the buffer. Always reads the store, never a memo.
  pub async fn begin(&mut self, key: &str) -> Result<(), TransactionError> {
    self.ensure_enabled()?;
    if let Some(active) = &self.state {
      return Err(TransactionError::AlreadyActive(active.key.clone()));
    }
    if key.is_empty() {
      tracing::warn!("cache transaction started with an empty key");
      return Err(TransactionError::EmptyKey);
    }

    let loaded = self
      .client
      .get(key)
      .await
      .and_then(CompositeValue::from_cache_value);

    match loaded {
      Some(buffer) => {
        tracing::debug!(cache_key = key, rows = buffer.len(), "cache transaction started");
        self.state = Some(TransactionState {
          key: key.to_string(),
          buffer,
        });
        Ok(())
      }
      None => {
        self.state = None;
        Err(TransactionError::NotComposite(key.to_string()))
      }
    }
  }

  /// Run `edit` on a scratch copy and keep the result only if it succeeded
  fn stage<F>(&mut self, op: &'static str, edit: F) -> Result<(), TransactionError>
  where
    F: FnOnce(&mut CompositeValue) -> Result<(), TransactionError>,
  {
    self.ensure_enabled()?;
    let Some(state) = self.state.as_mut() else {
      tracing::warn!(op, "cache row operation without an active transaction");
      return Err(TransactionError::NotActive);
    };

    let mut staged = state.buffer.clone();
    match edit(&mut staged) {
      Ok(()) => {
        state.buffer = staged;
        Ok(())
      }
      Err(err) => {
        if err.is_programming_error() {
          tracing::error!(cache_key = %state.key, op, "{} for cache {}", err, state.key);
        }
        Err(err)
      }
    }
  }

  /// Apply field edits to one row, or to the buffer's top level with
  /// [`RowSelector::Whole`]. Every field must already exist.
  pub fn update_row<I, K>(&mut self, selector: RowSelector, edits: I) -> Result<(), TransactionError>
  where
    I: IntoIterator<Item = (K, FieldEdit)>,
    K: Into<String>,
  {
    let edits: Vec<(String, FieldEdit)> = edits.into_iter().map(|(k, e)| (k.into(), e)).collect();
    self.stage("update_row", |buffer| buffer.update_row(&selector, &edits))
  }

  /// Add arbitrary numeric deltas to existing fields
  pub fn increment_row<I, K>(&mut self, selector: RowSelector, deltas: I) -> Result<(), TransactionError>
  where
    I: IntoIterator<Item = (K, Number)>,
    K: Into<String>,
  {
    let edits: Vec<(String, FieldEdit)> = deltas
      .into_iter()
      .map(|(k, d)| (k.into(), FieldEdit::Increment(d)))
      .collect();
    self.stage("increment_row", |buffer| buffer.update_row(&selector, &edits))
  }

  /// Insert at the front: keyed when `key` is given, positional otherwise
  pub fn insert_front(&mut self, key: Option<RowKey>, value: Value) -> Result<(), TransactionError> {
    self.stage("insert_front", |buffer| {
      buffer.insert_front(key, value);
      Ok(())
    })
  }

  /// Insert at the back: keyed when `key` is given, positional otherwise
  pub fn insert_back(&mut self, key: Option<RowKey>, value: Value) -> Result<(), TransactionError> {
    self.stage("insert_back", |buffer| {
      buffer.insert_back(key, value);
      Ok(())
    })
  }

  /// Set the row under `key` in place, or append positionally without one
  pub fn insert(&mut self, key: Option<RowKey>, value: Value) -> Result<(), TransactionError> {
    self.stage("insert", |buffer| {
      buffer.insert(key, value);
      Ok(())
    })
  }

  pub fn delete_row(&mut self, key: &RowKey) -> Result<(), TransactionError> {
    self.stage("delete_row", |buffer| buffer.delete_row(key))
  }

  pub fn update_transaction(&mut self, edit: &BulkEdit) -> Result<(), TransactionError> {
    self.stage("update_transaction", |buffer| buffer.apply(edit))
  }

  /// Write the whole buffer back in one `set` and return to `Idle`.
  ///
  /// The transaction ends even when the write fails.
  pub async fn commit(&mut self, ttl: Duration) -> Result<(), TransactionError> {
    self.ensure_enabled()?;
    let Some(state) = self.state.take() else {
      tracing::warn!("cache commit without an active transaction");
      return Err(TransactionError::NotActive);
    };

    let rows = state.buffer.len();
    let value = state.buffer.to_cache_value();
    if self.client.set(&state.key, value.clone(), ttl).await {
      tracing::debug!(cache_key = %state.key, rows, "cache transaction committed");
      if let Some(commits) = &self.commits {
        commits.lock().push((state.key, value));
      }
      Ok(())
    } else {
      Err(TransactionError::WriteFailed(state.key))
    }
  }

  /// Drop the buffer without writing. Safe to call at any time.
  pub fn cancel(&mut self) {
    if let Some(state) = self.state.take() {
      tracing::debug!(cache_key = %state.key, "cache transaction cancelled");
    }
  }

  /// One-shot `begin`, edit, `commit` while idle. While a transaction is
  /// already active the edit is only staged, leaving the commit to the
  /// caller that began it.
  pub async fn apply_and_commit(
    &mut self,
    key: &str,
    edit: &BulkEdit,
    ttl: Duration,
  ) -> Result<(), TransactionError> {
    self.ensure_enabled()?;
    if self.is_active() {
      return self.update_transaction(edit);
    }

    self.begin(key).await?;
    if let Err(err) = self.update_transaction(edit) {
      self.cancel();
      return Err(err);
    }
    self.commit(ttl).await
  }
}
