//! Latency accounting for remote cache operations

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Remote operation kinds reported to a [`LatencySink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
  Get,
  Set,
  Replace,
  Delete,
  Expire,
  Stats,
}

impl CacheOp {
  pub const ALL: [CacheOp; 6] = [
    CacheOp::Get,
    CacheOp::Set,
    CacheOp::Replace,
    CacheOp::Delete,
    CacheOp::Expire,
    CacheOp::Stats,
  ];

  fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for CacheOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      CacheOp::Get => "get",
      CacheOp::Set => "set",
      CacheOp::Replace => "replace",
      CacheOp::Delete => "delete",
      CacheOp::Expire => "expire",
      CacheOp::Stats => "stats",
    };
    f.write_str(name)
  }
}

/// Receives one sample per remote operation
pub trait LatencySink: Send + Sync {
  fn record(&self, op: CacheOp, elapsed: Duration);
}

/// Discards every sample
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LatencySink for NoopSink {
  fn record(&self, _op: CacheOp, _elapsed: Duration) {}
}

/// Per-operation call counts and summed latency
#[derive(Debug, Default)]
pub struct LatencyTotals {
  micros: [AtomicU64; 6],
  calls: [AtomicU64; 6],
}

impl LatencyTotals {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn total(&self) -> Duration {
    let micros = self
      .micros
      .iter()
      .map(|m| m.load(Ordering::Relaxed))
      .sum::<u64>();
    Duration::from_micros(micros)
  }

  pub fn time(&self, op: CacheOp) -> Duration {
    Duration::from_micros(self.micros[op.index()].load(Ordering::Relaxed))
  }

  pub fn calls(&self, op: CacheOp) -> u64 {
    self.calls[op.index()].load(Ordering::Relaxed)
  }
}

impl LatencySink for LatencyTotals {
  fn record(&self, op: CacheOp, elapsed: Duration) {
    let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    self.micros[op.index()].fetch_add(micros, Ordering::Relaxed);
    self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
  }
}
