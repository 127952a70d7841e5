//! Redis Streams implementation of the sluice messaging stream client.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// The Redis-backed stream client.
pub mod client;

/// Connection and pool configuration.
pub mod config;

pub use client::RedisStreamClient;
pub use config::RedisConfig;
