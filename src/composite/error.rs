use thiserror::Error;

/// Failures reported by [`CompositeBuffer`](super::CompositeBuffer).
///
/// None of these leave the buffer in a partially edited state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
  #[error("no transaction is active")]
  NotActive,

  #[error("a transaction on '{0}' is already active")]
  AlreadyActive(String),

  #[error("caching is disabled")]
  Disabled,

  #[error("transaction key is empty")]
  EmptyKey,

  #[error("value under '{0}' is missing or not a composite value")]
  NotComposite(String),

  #[error("bad transaction field '{0}'")]
  UnknownField(String),

  #[error("field '{0}' is not numeric")]
  NonNumericField(String),

  #[error("row '{0}' does not exist")]
  MissingRow(String),

  #[error("row '{0}' cannot be addressed by field")]
  InvalidSelector(String),

  #[error("{rows} rows but {values} values")]
  LengthMismatch { rows: usize, values: usize },

  #[error("write of '{0}' did not reach the cache")]
  WriteFailed(String),
}

impl TransactionError {
  /// Errors that can only come from a caller bug, as opposed to protocol
  /// misuse or a cache outage.
  pub fn is_programming_error(&self) -> bool {
    matches!(
      self,
      TransactionError::UnknownField(_)
        | TransactionError::NonNumericField(_)
        | TransactionError::MissingRow(_)
        | TransactionError::InvalidSelector(_)
        | TransactionError::LengthMismatch { .. }
    )
  }
}
