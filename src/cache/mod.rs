//! Cache client layer
//!
//! Provides:
//! - A soft-failing [`CacheClient`] over any [`CacheStore`]
//! - Per-scope hit memoization and operator-triggered invalidation
//! - A builtin in-memory store and, with the `server` feature, a Redis proxy

mod client;
pub mod config;
mod entry;
mod gate;
mod memo;
mod metrics;
#[cfg(feature = "server")]
pub mod proxy;
mod scope;
mod store;

pub use client::CacheClient;
pub use config::{CacheConfig, CacheMode, CacheProxyConfig, DEFAULT_TTL};
pub use entry::{CacheEntry, CacheValue};
pub use gate::{GateOutcome, InvalidationDirective, InvalidationGate, PersistentKeyPattern};
pub use memo::{HitMemo, HitRecord};
pub use metrics::{CacheOp, LatencySink, LatencyTotals, NoopSink};
#[cfg(feature = "server")]
pub use proxy::RedisProxyClient;
pub use scope::CacheScope;
pub use store::{CacheStats, CacheStore, CacheStoreError, InMemoryCacheStore};
