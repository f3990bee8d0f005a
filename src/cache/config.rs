//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::gate::{InvalidationGate, PersistentKeyPattern};

/// Default entry lifetime: 30 days
pub const DEFAULT_TTL: Duration = Duration::from_secs(2_592_000);

/// Keys that survive operator-triggered mass invalidation
pub const DEFAULT_PERSISTENT_KEYS: &[&str] = &["stats_*", "percentiles_*", "top10tor_*"];

/// Cache mode: builtin in-memory or proxy to external Redis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  /// In-process store, mostly for development and tests
  Builtin,
  /// External Redis server (default)
  #[default]
  Proxy,
}

impl std::fmt::Display for CacheMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheMode::Builtin => write!(f, "builtin"),
      CacheMode::Proxy => write!(f, "proxy"),
    }
  }
}

impl std::str::FromStr for CacheMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "builtin" | "memory" | "inmemory" => Ok(CacheMode::Builtin),
      "proxy" | "external" | "redis" => Ok(CacheMode::Proxy),
      _ => Err(format!("Unknown cache mode: {}", s)),
    }
  }
}

/// Configuration for proxy mode (external Redis)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheProxyConfig {
  /// Redis host, or `unix:///path/to/socket`
  #[serde(default = "default_host")]
  pub host: String,

  /// Redis port (ignored for unix sockets)
  #[serde(default = "default_redis_port")]
  pub port: u16,

  /// Redis password (optional)
  #[serde(default)]
  pub password: Option<String>,

  /// Redis database number
  #[serde(default)]
  pub database: u8,

  /// Enable TLS
  #[serde(default)]
  pub tls_enabled: bool,
}

fn default_host() -> String {
  "localhost".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

impl Default for CacheProxyConfig {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_redis_port(),
      password: None,
      database: 0,
      tls_enabled: false,
    }
  }
}

impl CacheProxyConfig {
  /// Check if the proxy config has a host configured
  pub fn is_configured(&self) -> bool {
    !self.host.is_empty()
  }

  /// Socket path when the host uses the `unix://` form
  pub fn socket_path(&self) -> Option<&str> {
    self.host.strip_prefix("unix://")
  }

  /// Generate Redis connection URL
  pub fn connection_url(&self) -> String {
    let password = self.password.as_deref().filter(|p| !p.is_empty());

    if let Some(path) = self.socket_path() {
      let mut url = format!("redis+unix://{}?db={}", path, self.database);
      if let Some(pwd) = password {
        url.push_str(&format!("&pass={}", pwd));
      }
      return url;
    }

    let scheme = if self.tls_enabled { "rediss" } else { "redis" };
    let auth = match password {
      Some(pwd) => format!(":{}@", pwd),
      None => String::new(),
    };
    format!(
      "{}://{}{}:{}/{}",
      scheme, auth, self.host, self.port, self.database
    )
  }
}

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
  /// Master switch; when false every cache operation is a no-op
  #[serde(default = "default_true")]
  pub enabled: bool,

  /// Record per-scope hits and fetch latency
  #[serde(default = "default_true")]
  pub memo: bool,

  /// Default TTL in seconds
  #[serde(default = "default_ttl_secs")]
  pub default_ttl: u64,

  /// Exact keys or `prefix*` patterns exempt from invalidation directives
  #[serde(default = "default_persistent_keys")]
  pub persistent_keys: Vec<PersistentKeyPattern>,

  /// Cache mode: builtin or proxy
  #[serde(default)]
  pub mode: CacheMode,
}

fn default_true() -> bool {
  true
}

fn default_ttl_secs() -> u64 {
  DEFAULT_TTL.as_secs()
}

fn default_persistent_keys() -> Vec<PersistentKeyPattern> {
  DEFAULT_PERSISTENT_KEYS
    .iter()
    .map(|p| PersistentKeyPattern::new(*p))
    .collect()
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      memo: true,
      default_ttl: default_ttl_secs(),
      persistent_keys: default_persistent_keys(),
      mode: CacheMode::default(),
    }
  }
}

impl CacheConfig {
  pub fn default_ttl(&self) -> Duration {
    Duration::from_secs(self.default_ttl)
  }

  /// Gate built from the configured persistent keys
  pub fn gate(&self) -> InvalidationGate {
    InvalidationGate::new(self.persistent_keys.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_connection_url_tcp() {
    let config = CacheProxyConfig {
      host: "10.10.0.1".to_string(),
      port: 11211,
      password: Some("s3cret".to_string()),
      database: 2,
      tls_enabled: false,
    };
    assert_eq!(config.connection_url(), "redis://:s3cret@10.10.0.1:11211/2");
  }

  #[test]
  fn test_connection_url_tls_without_password() {
    let config = CacheProxyConfig {
      tls_enabled: true,
      password: Some(String::new()),
      ..Default::default()
    };
    assert_eq!(config.connection_url(), "rediss://localhost:6379/0");
  }

  #[test]
  fn test_connection_url_unix_socket() {
    let config = CacheProxyConfig {
      host: "unix:///var/run/redis.sock".to_string(),
      port: 6379,
      password: None,
      database: 1,
      tls_enabled: false,
    };
    assert_eq!(config.socket_path(), Some("/var/run/redis.sock"));
    assert_eq!(
      config.connection_url(),
      "redis+unix:///var/run/redis.sock?db=1"
    );
  }

  #[test]
  fn test_proxy_needs_a_host() {
    assert!(CacheProxyConfig::default().is_configured());
    let config = CacheProxyConfig {
      host: String::new(),
      ..Default::default()
    };
    assert!(!config.is_configured());
  }

  #[test]
  fn test_cache_mode_parse() {
    assert_eq!("redis".parse::<CacheMode>().unwrap(), CacheMode::Proxy);
    assert_eq!("memory".parse::<CacheMode>().unwrap(), CacheMode::Builtin);
    assert!("memcache".parse::<CacheMode>().is_err());
  }

  #[test]
  fn test_defaults() {
    let config = CacheConfig::default();
    assert!(config.enabled);
    assert!(config.memo);
    assert_eq!(config.default_ttl(), DEFAULT_TTL);
    assert_eq!(config.persistent_keys.len(), 3);
    assert_eq!(config.mode, CacheMode::Proxy);
  }
}
