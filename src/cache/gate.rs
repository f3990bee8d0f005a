//! Operator-triggered invalidation
//!
//! An [`InvalidationDirective`] arrives out of band (a query parameter, an
//! admin command) and is handed to the [`InvalidationGate`] together with the
//! key currently being read. Keys matching a [`PersistentKeyPattern`] are
//! never evicted.

use serde::{Deserialize, Serialize};

use super::client::CacheClient;
use super::config::DEFAULT_PERSISTENT_KEYS;
use super::memo::HitMemo;

const WILDCARD: char = '*';

/// An exact key, or a literal prefix followed by a trailing `*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PersistentKeyPattern {
  raw: String,
}

impl PersistentKeyPattern {
  pub fn new(raw: impl Into<String>) -> Self {
    Self { raw: raw.into() }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn matches(&self, key: &str) -> bool {
    match self.raw.strip_suffix(WILDCARD) {
      Some(prefix) => key.starts_with(prefix),
      None => key == self.raw,
    }
  }
}

impl From<String> for PersistentKeyPattern {
  fn from(raw: String) -> Self {
    Self { raw }
  }
}

impl From<&str> for PersistentKeyPattern {
  fn from(raw: &str) -> Self {
    Self::new(raw)
  }
}

impl From<PersistentKeyPattern> for String {
  fn from(pattern: PersistentKeyPattern) -> Self {
    pattern.raw
  }
}

/// What the operator asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationDirective {
  /// Sweep every memoized key plus the key being read
  ClearAll,
  /// Clear one key: either the one being read or another memoized key
  Key(String),
}

impl InvalidationDirective {
  /// `"1"` means clear all; any other non-empty value names a key
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "" => None,
      "1" => Some(InvalidationDirective::ClearAll),
      key => Some(InvalidationDirective::Key(key.to_string())),
    }
  }
}

/// How the current read should continue after the gate ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
  /// Report a miss so the caller regenerates the value
  ForceMiss,
  /// Read normally
  Proceed,
}

#[derive(Debug, Clone)]
pub struct InvalidationGate {
  patterns: Vec<PersistentKeyPattern>,
}

impl Default for InvalidationGate {
  fn default() -> Self {
    Self::new(
      DEFAULT_PERSISTENT_KEYS
        .iter()
        .map(|p| PersistentKeyPattern::new(*p))
        .collect(),
    )
  }
}

impl InvalidationGate {
  pub fn new(patterns: Vec<PersistentKeyPattern>) -> Self {
    Self { patterns }
  }

  pub fn patterns(&self) -> &[PersistentKeyPattern] {
    &self.patterns
  }

  pub fn is_persistent(&self, key: &str) -> bool {
    self.patterns.iter().any(|p| p.matches(key))
  }

  /// Run `directive` for a read of `target`.
  ///
  /// Clearing all keys or `target` itself forces a miss for a non-persistent
  /// target. Naming some other key only evicts that key, and the read of
  /// `target` proceeds normally.
  pub async fn apply(
    &self,
    directive: &InvalidationDirective,
    target: &str,
    memo: &mut HitMemo,
    client: &CacheClient,
  ) -> GateOutcome {
    match directive {
      InvalidationDirective::ClearAll => {
        let mut swept = 0usize;
        for key in memo.keys() {
          if self.is_persistent(&key) {
            continue;
          }
          client.delete(&key).await;
          memo.forget(&key);
          swept += 1;
        }
        tracing::info!(cache_key = target, swept, "cache clear-all directive applied");
        self.clear_target(target, memo, client).await
      }
      InvalidationDirective::Key(key) if key == target => {
        tracing::info!(cache_key = target, "cache clear directive applied to current key");
        self.clear_target(target, memo, client).await
      }
      InvalidationDirective::Key(key) => {
        if memo.contains(key) && !self.is_persistent(key) {
          memo.forget(key);
          client.delete(key).await;
          tracing::info!(cache_key = target, cleared = %key, "cache clear directive applied to named key");
        }
        GateOutcome::Proceed
      }
    }
  }

  async fn clear_target(&self, target: &str, memo: &mut HitMemo, client: &CacheClient) -> GateOutcome {
    if self.is_persistent(target) {
      return GateOutcome::Proceed;
    }
    memo.forget(target);
    client.delete(target).await;
    GateOutcome::ForceMiss
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_prefix_pattern() {
    let pattern = PersistentKeyPattern::new("stats_*");
    assert!(pattern.matches("stats_daily"));
    assert!(pattern.matches("stats_"));
    assert!(!pattern.matches("stat_daily"));
    assert!(!pattern.matches("user_stats_daily"));
  }

  #[test]
  fn test_exact_pattern() {
    let pattern = PersistentKeyPattern::new("site_options");
    assert!(pattern.matches("site_options"));
    assert!(!pattern.matches("site_options_2"));
    assert!(!pattern.matches("site_option"));
  }

  #[test]
  fn test_default_gate_patterns() {
    let gate = InvalidationGate::default();
    assert!(gate.is_persistent("percentiles_upload"));
    assert!(gate.is_persistent("top10tor_day"));
    assert!(!gate.is_persistent("user_42"));
  }

  #[test]
  fn test_directive_parse() {
    assert_eq!(InvalidationDirective::parse(""), None);
    assert_eq!(
      InvalidationDirective::parse("1"),
      Some(InvalidationDirective::ClearAll)
    );
    assert_eq!(
      InvalidationDirective::parse("thread_7"),
      Some(InvalidationDirective::Key("thread_7".to_string()))
    );
  }

  #[test]
  fn test_pattern_serde_as_string() {
    let patterns: Vec<PersistentKeyPattern> =
      serde_json::from_str(r#"["stats_*", "motd"]"#).unwrap();
    assert_eq!(patterns[0].as_str(), "stats_*");
    assert_eq!(serde_json::to_string(&patterns).unwrap(), r#"["stats_*","motd"]"#);
  }
}
