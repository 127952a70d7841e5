use serde::Deserialize;

/// Connection and pool settings for
/// [`RedisStreamClient`](crate::RedisStreamClient).
///
/// The record is deserializable so processes can decode it from whatever
/// configuration format they already use; loading the file is the caller's
/// concern.
#[derive(Clone, Debug, Deserialize)]
pub struct RedisConfig {
    /// Store address, `host:port` (or a socket path for `unix`).
    pub addr: String,

    /// Transport, `tcp` or `unix`.
    #[serde(default = "default_network")]
    pub network: String,

    /// Dial and borrow timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on idle connections retained by the pool.
    ///
    /// Accepted for config-surface compatibility. The pool bounds total
    /// connections through `max_active` and health-checks connections on
    /// reuse rather than tracking a separate idle watermark.
    #[serde(default)]
    pub max_idle: usize,

    /// Idle eviction age in milliseconds (see `max_idle`).
    #[serde(default)]
    pub idle_timeout_ms: u64,

    /// Upper bound on concurrently borrowed connections.
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    /// Whether a borrow waits for a free connection when the pool is
    /// exhausted, or fails fast.
    #[serde(default = "default_wait")]
    pub wait: bool,
}

fn default_network() -> String {
    "tcp".to_string()
}

const fn default_timeout_ms() -> u64 {
    1000
}

const fn default_max_active() -> usize {
    16
}

const fn default_wait() -> bool {
    true
}
