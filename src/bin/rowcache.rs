use clap::{Parser, Subcommand};
use rowcache::cache::{
  CacheClient, CacheMode, CacheScope, CacheStore, CacheValue, InMemoryCacheStore,
  InvalidationDirective, NoopSink, RedisProxyClient,
};
use rowcache::composite::{CompositeBuffer, FieldEdit, RowKey, RowSelector};
use rowcache::config::RowcacheConfig;
use serde_json::{json, Number, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rowcache", about = "Inspect and edit cached rows", version)]
struct Args {
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long, env = "ROWCACHE_HOST")]
  host: Option<String>,
  #[arg(short, long, env = "ROWCACHE_PORT")]
  port: Option<u16>,
  #[arg(long)]
  mode: Option<CacheMode>,
  #[arg(long)]
  log_level: Option<String>,
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Read a key
  Get { key: String },
  /// Write a key; the value is parsed as JSON, falling back to a string
  Set {
    key: String,
    value: String,
    #[arg(long)]
    ttl: Option<u64>,
  },
  /// Write a key only if it already exists
  Replace {
    key: String,
    value: String,
    #[arg(long)]
    ttl: Option<u64>,
  },
  /// Remove a key
  Delete { key: String },
  /// Give an existing key a new lifetime
  Expire {
    key: String,
    #[arg(long)]
    ttl: u64,
  },
  /// Show store statistics
  Stats,
  /// Run an invalidation directive ("1" clears all) against a read of `key`
  Clear { directive: String, key: String },
  /// Edit fields of one row of a composite value and commit
  UpdateRow {
    key: String,
    row: String,
    #[arg(long = "set", value_parser = parse_assignment)]
    set: Vec<(String, Value)>,
    #[arg(long = "add", value_parser = parse_delta)]
    add: Vec<(String, Number)>,
    #[arg(long)]
    ttl: Option<u64>,
  },
  /// Remove one row of a composite value and commit
  DeleteRow {
    key: String,
    row: String,
    #[arg(long)]
    ttl: Option<u64>,
  },
}

fn split_assignment(s: &str) -> Result<(&str, &str), String> {
  s.split_once('=')
    .filter(|(field, _)| !field.is_empty())
    .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", s))
}

fn parse_assignment(s: &str) -> Result<(String, Value), String> {
  let (field, raw) = split_assignment(s)?;
  Ok((field.to_string(), parse_value(raw)))
}

fn parse_delta(s: &str) -> Result<(String, Number), String> {
  let (field, raw) = split_assignment(s)?;
  match serde_json::from_str::<Value>(raw) {
    Ok(Value::Number(n)) => Ok((field.to_string(), n)),
    _ => Err(format!("'{}' is not a number", raw)),
  }
}

fn parse_value(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_row(raw: &str) -> RowKey {
  match raw.parse::<i64>() {
    Ok(i) => RowKey::Index(i),
    Err(_) => RowKey::Name(raw.to_string()),
  }
}

fn print_json(value: &Value) -> Result<(), anyhow::Error> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    RowcacheConfig::from_file(path)?
  } else {
    RowcacheConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(host) = args.host {
    config.proxy.host = host;
  }
  if let Some(port) = args.port {
    config.proxy.port = port;
  }
  if let Some(mode) = args.mode {
    config.cache.mode = mode;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let store: Arc<dyn CacheStore> = match config.cache.mode {
    CacheMode::Builtin => {
      tracing::warn!("builtin cache mode keeps nothing between invocations");
      Arc::new(InMemoryCacheStore::new(Some(config.cache.default_ttl())))
    }
    CacheMode::Proxy => {
      if !config.proxy.is_configured() {
        anyhow::bail!("proxy mode needs proxy.host (or --host / ROWCACHE_HOST)");
      }
      let proxy = RedisProxyClient::new(&config.proxy).await?;
      proxy.test_connection().await?;
      Arc::new(proxy)
    }
  };

  let client = CacheClient::from_config(store, Arc::new(NoopSink), &config.cache);
  let default_ttl = client.default_ttl();
  let ttl_or_default = |ttl: Option<u64>| ttl.map_or(default_ttl, Duration::from_secs);

  match args.command {
    Commands::Get { key } => {
      let value = client.get(&key).await.map(|v| v.to_json());
      print_json(&json!({ "key": key, "value": value }))
    }
    Commands::Set { key, value, ttl } => {
      let stored = client
        .set(&key, CacheValue::from(parse_value(&value)), ttl_or_default(ttl))
        .await;
      print_json(&json!({ "key": key, "stored": stored }))
    }
    Commands::Replace { key, value, ttl } => {
      let replaced = client
        .replace(&key, CacheValue::from(parse_value(&value)), ttl_or_default(ttl))
        .await;
      print_json(&json!({ "key": key, "replaced": replaced }))
    }
    Commands::Delete { key } => {
      let deleted = client.delete(&key).await;
      print_json(&json!({ "key": key, "deleted": deleted }))
    }
    Commands::Expire { key, ttl } => {
      let updated = client.expire(&key, Duration::from_secs(ttl)).await;
      print_json(&json!({ "key": key, "updated": updated }))
    }
    Commands::Stats => {
      let stats = client.stats().await;
      print_json(&json!({
        "enabled": client.is_enabled(),
        "stats": stats.map(|s| json!({
          "keys": s.keys,
          "memory_used": s.memory_used,
          "memory_limit": s.memory_limit,
          "hits": s.hits,
          "misses": s.misses,
          "expired": s.expired,
          "hit_rate": s.hit_rate(),
        })),
      }))
    }
    Commands::Clear { directive, key } => {
      let directive = InvalidationDirective::parse(&directive);
      let mut scope = CacheScope::new(client.clone(), Arc::new(config.cache.gate()))
        .with_directive(directive)
        .with_can_clear(true);
      let value = scope.get_value(&key, true).await.map(|v| v.to_json());
      print_json(&json!({ "key": key, "value": value }))
    }
    Commands::UpdateRow {
      key,
      row,
      set,
      add,
      ttl,
    } => {
      let edits = set
        .into_iter()
        .map(|(field, value)| (field, FieldEdit::Set(value)))
        .chain(
          add
            .into_iter()
            .map(|(field, delta)| (field, FieldEdit::Increment(delta))),
        );

      let mut buffer = CompositeBuffer::new(client.clone());
      buffer.begin(&key).await?;
      if let Err(e) = buffer.update_row(RowSelector::Row(parse_row(&row)), edits) {
        buffer.cancel();
        return Err(e.into());
      }
      buffer.commit(ttl_or_default(ttl)).await?;
      print_json(&json!({ "key": key, "row": row, "committed": true }))
    }
    Commands::DeleteRow { key, row, ttl } => {
      let mut buffer = CompositeBuffer::new(client.clone());
      buffer.begin(&key).await?;
      if let Err(e) = buffer.delete_row(&parse_row(&row)) {
        buffer.cancel();
        return Err(e.into());
      }
      buffer.commit(ttl_or_default(ttl)).await?;
      print_json(&json!({ "key": key, "row": row, "committed": true }))
    }
  }
}
