//! Cache entry types

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A cached entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: String,
  pub value: CacheValue,
  pub ttl: Option<Duration>,
  pub created_at: Instant,
  pub expires_at: Option<Instant>,
}

impl CacheEntry {
  pub fn new(key: String, value: CacheValue, ttl: Option<Duration>) -> Self {
    let now = Instant::now();
    let expires_at = ttl.map(|d| now + d);
    Self {
      key,
      value,
      ttl,
      created_at: now,
      expires_at,
    }
  }

  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map(|exp| Instant::now() > exp)
      .unwrap_or(false)
  }

  pub fn ttl_remaining(&self) -> Option<Duration> {
    self.expires_at.and_then(|exp| {
      let now = Instant::now();
      if now > exp {
        None
      } else {
        Some(exp - now)
      }
    })
  }

  /// Approximate footprint of key plus value, in bytes
  pub fn size(&self) -> usize {
    self.key.len() + self.value.approximate_size()
  }
}

/// Cache value types (JSON-compatible)
///
/// Composite values (arrays and objects of rows) always live in the `Json`
/// variant; scalars get their own variants so counters and flags stay cheap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheValue {
  #[default]
  Null,
  String(String),
  Integer(i64),
  /// Arrays, objects, booleans and non-integer numbers. Other JSON shapes
  /// are folded into the scalar variants by [`normalize`](Self::normalize).
  Json(serde_json::Value),
}

impl CacheValue {
  pub fn approximate_size(&self) -> usize {
    match self {
      CacheValue::Null => 0,
      CacheValue::String(s) => s.len(),
      CacheValue::Integer(_) => 8,
      CacheValue::Json(v) => estimate_json_size(v),
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      CacheValue::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      CacheValue::Integer(i) => Some(*i),
      CacheValue::String(s) => s.parse().ok(),
      _ => None,
    }
  }

  /// True for JSON arrays and objects, the only shapes a transaction can stage
  pub fn is_composite(&self) -> bool {
    matches!(
      self,
      CacheValue::Json(serde_json::Value::Array(_)) | CacheValue::Json(serde_json::Value::Object(_))
    )
  }

  pub fn to_json(&self) -> serde_json::Value {
    match self {
      CacheValue::Null => serde_json::Value::Null,
      CacheValue::String(s) => serde_json::Value::String(s.clone()),
      CacheValue::Integer(i) => serde_json::Value::Number((*i).into()),
      CacheValue::Json(v) => v.clone(),
    }
  }

  /// The form this value takes after a trip through the wire
  pub fn normalize(self) -> Self {
    match self {
      CacheValue::Json(v) => CacheValue::from(v),
      other => other,
    }
  }

  /// Encode for the wire. Every variant is written as JSON text so that
  /// `"5"` and `5` survive a round trip as different values.
  pub fn to_bytes(&self) -> Vec<u8> {
    serde_json::to_vec(&self.to_json()).unwrap_or_default()
  }

  /// Decode a wire payload. Payloads that are not JSON (written by other
  /// clients) come back as plain strings.
  pub fn from_bytes(bytes: &[u8]) -> Self {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
      Ok(v) => CacheValue::from(v),
      Err(_) => CacheValue::String(String::from_utf8_lossy(bytes).into_owned()),
    }
  }
}

impl From<String> for CacheValue {
  fn from(s: String) -> Self {
    CacheValue::String(s)
  }
}

impl From<&str> for CacheValue {
  fn from(s: &str) -> Self {
    CacheValue::String(s.to_string())
  }
}

impl From<i64> for CacheValue {
  fn from(i: i64) -> Self {
    CacheValue::Integer(i)
  }
}

impl From<serde_json::Value> for CacheValue {
  fn from(v: serde_json::Value) -> Self {
    match v {
      serde_json::Value::Null => CacheValue::Null,
      serde_json::Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          CacheValue::Integer(i)
        } else {
          CacheValue::Json(serde_json::Value::Number(n))
        }
      }
      serde_json::Value::String(s) => CacheValue::String(s),
      other => CacheValue::Json(other),
    }
  }
}

fn estimate_json_size(v: &serde_json::Value) -> usize {
  match v {
    serde_json::Value::Null => 4,
    serde_json::Value::Bool(_) => 5,
    serde_json::Value::Number(_) => 8,
    serde_json::Value::String(s) => s.len() + 2,
    serde_json::Value::Array(arr) => arr.iter().map(estimate_json_size).sum::<usize>() + arr.len(),
    serde_json::Value::Object(map) => map
      .iter()
      .map(|(k, v)| k.len() + estimate_json_size(v) + 4)
      .sum(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_wire_keeps_strings_and_integers_apart() {
    let s = CacheValue::String("5".to_string());
    let i = CacheValue::Integer(5);
    assert_eq!(CacheValue::from_bytes(&s.to_bytes()), s);
    assert_eq!(CacheValue::from_bytes(&i.to_bytes()), i);
  }

  #[test]
  fn test_wire_preserves_row_order() {
    let value = CacheValue::Json(json!({"9": {"title": "z"}, "1": {"title": "a"}}));
    let decoded = CacheValue::from_bytes(&value.to_bytes());
    let keys: Vec<_> = match &decoded {
      CacheValue::Json(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
      other => panic!("expected object, got {:?}", other),
    };
    assert_eq!(keys, vec!["9", "1"]);
  }

  #[test]
  fn test_json_scalars_normalize_like_the_wire() {
    for value in [
      CacheValue::Json(json!("x")),
      CacheValue::Json(json!(5)),
      CacheValue::Json(json!(null)),
      CacheValue::Json(json!(1.5)),
    ] {
      assert_eq!(CacheValue::from_bytes(&value.to_bytes()), value.clone().normalize());
    }
    assert_eq!(CacheValue::Json(json!(5)).normalize(), CacheValue::Integer(5));
    assert_eq!(CacheValue::Json(json!("x")).normalize(), CacheValue::String("x".into()));
    assert_eq!(CacheValue::Json(json!(null)).normalize(), CacheValue::Null);
  }

  #[test]
  fn test_foreign_payload_decodes_as_string() {
    assert_eq!(
      CacheValue::from_bytes(b"hello world"),
      CacheValue::String("hello world".to_string())
    );
  }

  #[test]
  fn test_is_composite() {
    assert!(CacheValue::Json(json!([1, 2])).is_composite());
    assert!(CacheValue::Json(json!({"a": 1})).is_composite());
    assert!(!CacheValue::Integer(1).is_composite());
    assert!(!CacheValue::Json(json!(1.5)).is_composite());
    assert!(!CacheValue::Null.is_composite());
  }

  #[test]
  fn test_entry_expiry() {
    let entry = CacheEntry::new("k".into(), CacheValue::Null, Some(Duration::from_secs(60)));
    assert!(!entry.is_expired());
    assert!(entry.ttl_remaining().unwrap() <= Duration::from_secs(60));

    let forever = CacheEntry::new("k".into(), CacheValue::Null, None);
    assert!(forever.ttl_remaining().is_none());
    assert!(!forever.is_expired());
  }
}
