//! Composite values and the edits a transaction can stage on them

use serde_json::{Map, Number, Value};
use std::fmt;

use super::error::TransactionError;
use crate::cache::CacheValue;

/// Address of one row inside a [`CompositeValue`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
  Index(i64),
  Name(String),
}

impl RowKey {
  /// Object key form; indexes use their decimal representation
  pub fn map_key(&self) -> String {
    match self {
      RowKey::Index(i) => i.to_string(),
      RowKey::Name(name) => name.clone(),
    }
  }

  /// Position in a list, if this key can name one
  pub fn list_index(&self) -> Option<usize> {
    match self {
      RowKey::Index(i) => usize::try_from(*i).ok(),
      RowKey::Name(name) => name.parse().ok(),
    }
  }
}

impl fmt::Display for RowKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RowKey::Index(i) => write!(f, "{}", i),
      RowKey::Name(name) => f.write_str(name),
    }
  }
}

impl From<i64> for RowKey {
  fn from(i: i64) -> Self {
    RowKey::Index(i)
  }
}

impl From<&str> for RowKey {
  fn from(name: &str) -> Self {
    RowKey::Name(name.to_string())
  }
}

impl From<String> for RowKey {
  fn from(name: String) -> Self {
    RowKey::Name(name)
  }
}

/// Which fields an edit addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelector {
  /// The buffer's own top-level entries
  Whole,
  /// The fields of one row
  Row(RowKey),
}

impl RowSelector {
  pub fn row(key: impl Into<RowKey>) -> Self {
    RowSelector::Row(key.into())
  }
}

impl fmt::Display for RowSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RowSelector::Whole => f.write_str("*"),
      RowSelector::Row(key) => key.fmt(f),
    }
  }
}

/// Change to one existing field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEdit {
  Set(Value),
  Increment(Number),
}

impl FieldEdit {
  pub fn set(value: impl Into<Value>) -> Self {
    FieldEdit::Set(value.into())
  }

  pub fn increment() -> Self {
    FieldEdit::Increment(Number::from(1))
  }

  pub fn decrement() -> Self {
    FieldEdit::Increment(Number::from(-1))
  }

  pub fn add(delta: impl Into<Number>) -> Self {
    FieldEdit::Increment(delta.into())
  }
}

/// Whole-row and column edits applied by `update_transaction`
#[derive(Debug, Clone, PartialEq)]
pub enum BulkEdit {
  /// `buffer[row] = value`, creating the row when absent
  ReplaceRow { row: RowKey, value: Value },
  /// `buffer[rows[i]][field] = values[i]` for every `i`
  SetColumn {
    rows: Vec<RowKey>,
    field: String,
    values: Vec<Value>,
  },
}

/// A collection of rows stored under one cache key
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeValue {
  /// Positional rows
  List(Vec<Value>),
  /// Keyed rows, in insertion order
  Map(Map<String, Value>),
}

impl CompositeValue {
  /// `None` for scalars, which cannot be staged
  pub fn from_cache_value(value: CacheValue) -> Option<Self> {
    match value {
      CacheValue::Json(Value::Array(items)) => Some(CompositeValue::List(items)),
      CacheValue::Json(Value::Object(map)) => Some(CompositeValue::Map(map)),
      _ => None,
    }
  }

  pub fn to_json(&self) -> Value {
    match self {
      CompositeValue::List(items) => Value::Array(items.clone()),
      CompositeValue::Map(map) => Value::Object(map.clone()),
    }
  }

  pub fn to_cache_value(&self) -> CacheValue {
    CacheValue::Json(self.to_json())
  }

  pub fn len(&self) -> usize {
    match self {
      CompositeValue::List(items) => items.len(),
      CompositeValue::Map(map) => map.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn row(&self, key: &RowKey) -> Option<&Value> {
    match self {
      CompositeValue::List(items) => key.list_index().and_then(|i| items.get(i)),
      CompositeValue::Map(map) => map.get(&key.map_key()),
    }
  }

  pub fn contains_row(&self, key: &RowKey) -> bool {
    self.row(key).is_some()
  }

  /// Row keys in order
  pub fn keys(&self) -> Vec<RowKey> {
    match self {
      CompositeValue::List(items) => (0..items.len() as i64).map(RowKey::Index).collect(),
      CompositeValue::Map(map) => map.keys().cloned().map(RowKey::Name).collect(),
    }
  }

  // The edit methods below may stop halfway on error; CompositeBuffer runs
  // them against a scratch copy.

  pub(crate) fn update_row(
    &mut self,
    selector: &RowSelector,
    edits: &[(String, FieldEdit)],
  ) -> Result<(), TransactionError> {
    let mut fields = self.fields_mut(selector)?;
    for (name, edit) in edits {
      let slot = fields
        .get_mut(name)
        .ok_or_else(|| TransactionError::UnknownField(name.clone()))?;
      match edit {
        FieldEdit::Set(value) => *slot = value.clone(),
        FieldEdit::Increment(delta) => {
          *slot = add_numbers(slot, delta)
            .ok_or_else(|| TransactionError::NonNumericField(name.clone()))?;
        }
      }
    }
    Ok(())
  }

  pub(crate) fn insert_front(&mut self, key: Option<RowKey>, value: Value) {
    match (self, key) {
      (CompositeValue::List(items), None) => items.insert(0, value),
      (this, key) => {
        let map = this.promote_to_map();
        let key = match key {
          Some(key) => key.map_key(),
          None => next_index(map).to_string(),
        };
        map.shift_remove(&key);
        let mut front = Map::new();
        front.insert(key, value);
        front.extend(std::mem::take(map));
        *map = front;
      }
    }
  }

  pub(crate) fn insert_back(&mut self, key: Option<RowKey>, value: Value) {
    match (self, key) {
      (CompositeValue::List(items), None) => items.push(value),
      (CompositeValue::List(items), Some(key)) if key.list_index() == Some(items.len()) => {
        items.push(value)
      }
      (this, key) => {
        let map = this.promote_to_map();
        let key = match key {
          Some(key) => key.map_key(),
          None => next_index(map).to_string(),
        };
        map.shift_remove(&key);
        map.insert(key, value);
      }
    }
  }

  /// Set in place when the row exists, append otherwise
  pub(crate) fn insert(&mut self, key: Option<RowKey>, value: Value) {
    let Some(key) = key else {
      self.insert_back(None, value);
      return;
    };

    if let CompositeValue::List(items) = self {
      match key.list_index() {
        Some(i) if i < items.len() => {
          items[i] = value;
          return;
        }
        Some(i) if i == items.len() => {
          items.push(value);
          return;
        }
        _ => {}
      }
    }
    self.promote_to_map().insert(key.map_key(), value);
  }

  /// Rows keep their keys: removing anything but the last list entry turns
  /// the list into a map with decimal keys.
  pub(crate) fn delete_row(&mut self, key: &RowKey) -> Result<(), TransactionError> {
    let map_key = match self {
      CompositeValue::List(items) => match key.list_index() {
        Some(i) if i + 1 == items.len() => {
          items.pop();
          return Ok(());
        }
        Some(i) if i < items.len() => i.to_string(),
        _ => return Err(TransactionError::MissingRow(key.to_string())),
      },
      CompositeValue::Map(_) => key.map_key(),
    };
    self
      .promote_to_map()
      .shift_remove(&map_key)
      .map(|_| ())
      .ok_or_else(|| TransactionError::MissingRow(key.to_string()))
  }

  pub(crate) fn apply(&mut self, edit: &BulkEdit) -> Result<(), TransactionError> {
    match edit {
      BulkEdit::ReplaceRow { row, value } => {
        self.insert(Some(row.clone()), value.clone());
        Ok(())
      }
      BulkEdit::SetColumn {
        rows,
        field,
        values,
      } => {
        if rows.len() != values.len() {
          return Err(TransactionError::LengthMismatch {
            rows: rows.len(),
            values: values.len(),
          });
        }
        for (row, value) in rows.iter().zip(values) {
          let selector = RowSelector::Row(row.clone());
          self.fields_mut(&selector)?.set(field, value.clone())?;
        }
        Ok(())
      }
    }
  }

  fn fields_mut(&mut self, selector: &RowSelector) -> Result<Fields<'_>, TransactionError> {
    let key = match selector {
      RowSelector::Whole => {
        return Ok(match self {
          CompositeValue::List(items) => Fields::Array(items),
          CompositeValue::Map(map) => Fields::Object(map),
        })
      }
      RowSelector::Row(key) => key,
    };

    let row = match self {
      CompositeValue::List(items) => key.list_index().and_then(|i| items.get_mut(i)),
      CompositeValue::Map(map) => map.get_mut(&key.map_key()),
    };

    match row {
      Some(Value::Object(map)) => Ok(Fields::Object(map)),
      Some(Value::Array(items)) => Ok(Fields::Array(items)),
      Some(_) => Err(TransactionError::InvalidSelector(key.to_string())),
      None => Err(TransactionError::MissingRow(key.to_string())),
    }
  }

  fn promote_to_map(&mut self) -> &mut Map<String, Value> {
    if let CompositeValue::List(items) = self {
      let map = std::mem::take(items)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v))
        .collect();
      *self = CompositeValue::Map(map);
    }
    match self {
      CompositeValue::Map(map) => map,
      CompositeValue::List(_) => unreachable!("list was promoted above"),
    }
  }
}

/// Field view over a row (or over the whole buffer)
enum Fields<'a> {
  Object(&'a mut Map<String, Value>),
  Array(&'a mut Vec<Value>),
}

impl Fields<'_> {
  fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
    match self {
      Fields::Object(map) => map.get_mut(name),
      Fields::Array(items) => name.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
    }
  }

  /// Unlike `get_mut`, creates the field on objects
  fn set(&mut self, name: &str, value: Value) -> Result<(), TransactionError> {
    match self {
      Fields::Object(map) => {
        map.insert(name.to_string(), value);
        Ok(())
      }
      Fields::Array(_) => {
        let slot = self
          .get_mut(name)
          .ok_or_else(|| TransactionError::UnknownField(name.to_string()))?;
        *slot = value;
        Ok(())
      }
    }
  }
}

/// Smallest integer key above every integer key, or 0
fn next_index(map: &Map<String, Value>) -> i64 {
  map
    .keys()
    .filter_map(|k| k.parse::<i64>().ok().filter(|i| i.to_string() == *k))
    .max()
    .map_or(0, |max| max.saturating_add(1).max(0))
}

enum Numeric {
  Int(i64),
  Float(f64),
}

/// Numbers, and strings that hold one (rows loaded from SQL often carry
/// counters as text)
fn numeric(value: &Value) -> Option<Numeric> {
  match value {
    Value::Number(n) => n
      .as_i64()
      .map(Numeric::Int)
      .or_else(|| n.as_f64().map(Numeric::Float)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .map(Numeric::Int)
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Numeric::Float))
    }
    _ => None,
  }
}

fn add_numbers(current: &Value, delta: &Number) -> Option<Value> {
  let delta = numeric(&Value::Number(delta.clone()))?;
  match (numeric(current)?, delta) {
    (Numeric::Int(a), Numeric::Int(b)) => match a.checked_add(b) {
      Some(sum) => Some(Value::Number(sum.into())),
      None => Number::from_f64(a as f64 + b as f64).map(Value::Number),
    },
    (a, b) => Number::from_f64(a.as_f64() + b.as_f64()).map(Value::Number),
  }
}

impl Numeric {
  fn as_f64(&self) -> f64 {
    match self {
      Numeric::Int(i) => *i as f64,
      Numeric::Float(f) => *f,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn map(value: Value) -> CompositeValue {
    CompositeValue::from_cache_value(CacheValue::Json(value)).unwrap()
  }

  fn edits(pairs: &[(&str, FieldEdit)]) -> Vec<(String, FieldEdit)> {
    pairs
      .iter()
      .map(|(k, e)| (k.to_string(), e.clone()))
      .collect()
  }

  #[test]
  fn test_scalars_are_not_composite() {
    assert!(CompositeValue::from_cache_value(CacheValue::Integer(3)).is_none());
    assert!(CompositeValue::from_cache_value(CacheValue::String("[]".into())).is_none());
    assert!(CompositeValue::from_cache_value(CacheValue::Null).is_none());
  }

  #[test]
  fn test_increment_and_decrement() {
    let mut value = map(json!({"1": {"count": 5}}));
    let row = RowSelector::Row(RowKey::Index(1));
    value
      .update_row(&row, &edits(&[("count", FieldEdit::increment())]))
      .unwrap();
    assert_eq!(value.row(&RowKey::Index(1)), Some(&json!({"count": 6})));

    value
      .update_row(&row, &edits(&[("count", FieldEdit::add(-4))]))
      .unwrap();
    value
      .update_row(&row, &edits(&[("count", FieldEdit::decrement())]))
      .unwrap();
    assert_eq!(value.row(&RowKey::Index(1)), Some(&json!({"count": 1})));
  }

  #[test]
  fn test_increment_numeric_string_and_float() {
    let mut value = map(json!({"posts": "7", "ratio": 0.5}));
    value
      .update_row(
        &RowSelector::Whole,
        &edits(&[
          ("posts", FieldEdit::increment()),
          ("ratio", FieldEdit::Increment(Number::from_f64(0.25).unwrap())),
        ]),
      )
      .unwrap();
    assert_eq!(value.to_json(), json!({"posts": 8, "ratio": 0.75}));
  }

  #[test]
  fn test_increment_rejects_non_numeric() {
    let mut value = map(json!({"title": "hello"}));
    let err = value
      .update_row(&RowSelector::Whole, &edits(&[("title", FieldEdit::increment())]))
      .unwrap_err();
    assert_eq!(err, TransactionError::NonNumericField("title".into()));
  }

  #[test]
  fn test_unknown_field() {
    let mut value = map(json!({"1": {"title": "a"}}));
    let err = value
      .update_row(
        &RowSelector::Row(RowKey::Index(1)),
        &edits(&[("author", FieldEdit::set("x"))]),
      )
      .unwrap_err();
    assert_eq!(err, TransactionError::UnknownField("author".into()));
  }

  #[test]
  fn test_selector_on_scalar_row() {
    let mut value = map(json!({"count": 3}));
    let err = value
      .update_row(&RowSelector::row("count"), &edits(&[("x", FieldEdit::set(1))]))
      .unwrap_err();
    assert_eq!(err, TransactionError::InvalidSelector("count".into()));
  }

  #[test]
  fn test_insert_back_uses_next_integer_key() {
    let mut value = map(json!({"2": {"title": "b"}, "9": {"title": "x"}, "name": {}}));
    value.insert_back(None, json!({"title": "c"}));
    assert_eq!(value.keys().last(), Some(&RowKey::Name("10".into())));
  }

  #[test]
  fn test_insert_back_on_empty_map_starts_at_zero() {
    let mut value = map(json!({}));
    value.insert_back(None, json!("first"));
    assert_eq!(value.to_json(), json!({"0": "first"}));
  }

  #[test]
  fn test_insert_front_keyed_moves_existing_row() {
    let mut value = map(json!({"a": 1, "b": 2, "c": 3}));
    value.insert_front(Some("c".into()), json!(30));
    let keys: Vec<_> = value.keys().iter().map(RowKey::to_string).collect();
    assert_eq!(keys, ["c", "a", "b"]);
    assert_eq!(value.row(&"c".into()), Some(&json!(30)));
  }

  #[test]
  fn test_list_positional_inserts() {
    let mut value = map(json!(["b"]));
    value.insert_front(None, json!("a"));
    value.insert_back(None, json!("c"));
    value.insert(None, json!("d"));
    assert_eq!(value.to_json(), json!(["a", "b", "c", "d"]));
  }

  #[test]
  fn test_keyed_insert_promotes_list() {
    let mut value = map(json!(["a", "b"]));
    value.insert(Some("extra".into()), json!("z"));
    assert_eq!(value.to_json(), json!({"0": "a", "1": "b", "extra": "z"}));
  }

  #[test]
  fn test_insert_keeps_position_of_existing_row() {
    let mut value = map(json!({"a": 1, "b": 2}));
    value.insert(Some("a".into()), json!(10));
    assert_eq!(value.to_json(), json!({"a": 10, "b": 2}));
  }

  #[test]
  fn test_delete_row() {
    let mut value = map(json!({"1": "a", "2": "b"}));
    value.delete_row(&RowKey::Index(1)).unwrap();
    assert_eq!(value.to_json(), json!({"2": "b"}));
    assert_eq!(
      value.delete_row(&RowKey::Index(1)).unwrap_err(),
      TransactionError::MissingRow("1".into())
    );

    let mut list = map(json!(["a", "b", "c"]));
    list.delete_row(&RowKey::Index(2)).unwrap();
    assert_eq!(list.to_json(), json!(["a", "b"]));
  }

  #[test]
  fn test_delete_inside_list_keeps_row_keys() {
    let mut list = map(json!(["a", "b", "c"]));
    list.delete_row(&RowKey::Index(0)).unwrap();
    assert_eq!(list.to_json(), json!({"1": "b", "2": "c"}));
    assert_eq!(list.row(&RowKey::Index(2)), Some(&json!("c")));

    list.delete_row(&RowKey::Index(2)).unwrap();
    assert_eq!(list.to_json(), json!({"1": "b"}));
    assert_eq!(
      list.delete_row(&RowKey::Index(0)).unwrap_err(),
      TransactionError::MissingRow("0".into())
    );
  }

  #[test]
  fn test_insert_front_positional_on_map_uses_next_integer_key() {
    let mut value = map(json!({"3": "c", "5": "e"}));
    value.insert_front(None, json!("a"));
    assert_eq!(value.to_json(), json!({"6": "a", "3": "c", "5": "e"}));
  }

  #[test]
  fn test_set_column() {
    let mut value = map(json!({"1": {"locked": 0}, "2": {"locked": 0}}));
    value
      .apply(&BulkEdit::SetColumn {
        rows: vec![RowKey::Index(1), RowKey::Index(2)],
        field: "locked".into(),
        values: vec![json!(1), json!(0)],
      })
      .unwrap();
    assert_eq!(
      value.to_json(),
      json!({"1": {"locked": 1}, "2": {"locked": 0}})
    );
  }

  #[test]
  fn test_set_column_length_mismatch() {
    let mut value = map(json!({"1": {"locked": 0}}));
    let err = value
      .apply(&BulkEdit::SetColumn {
        rows: vec![RowKey::Index(1)],
        field: "locked".into(),
        values: vec![],
      })
      .unwrap_err();
    assert_eq!(err, TransactionError::LengthMismatch { rows: 1, values: 0 });
  }

  #[test]
  fn test_replace_row() {
    let mut value = map(json!({"1": {"title": "a"}}));
    value
      .apply(&BulkEdit::ReplaceRow {
        row: RowKey::Index(1),
        value: json!({"title": "b"}),
      })
      .unwrap();
    assert_eq!(value.to_json(), json!({"1": {"title": "b"}}));
  }
}
