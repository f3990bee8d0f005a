//! External Redis backend

mod client;

pub use client::RedisProxyClient;
