//! Request-scoped hit memoization, operator-triggered invalidation and staged
//! composite-value transactions over a remote key-value cache.

pub mod cache;
pub mod composite;
pub mod config;

pub use cache::{CacheClient, CacheScope, CacheValue, InvalidationDirective, InvalidationGate};
pub use composite::{CompositeBuffer, TransactionError};
pub use config::RowcacheConfig;
