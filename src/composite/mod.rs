//! Composite cache values and their transactions
//!
//! A composite value is a list or map of rows stored under a single cache
//! key. [`CompositeBuffer`] loads one into memory, stages row edits on it and
//! writes it back with a single `set`.

mod buffer;
mod error;
mod value;

pub use buffer::CompositeBuffer;
pub(crate) use buffer::CommitLog;
pub use error::TransactionError;
pub use value::{BulkEdit, CompositeValue, FieldEdit, RowKey, RowSelector};
