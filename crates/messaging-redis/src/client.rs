use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{Value, cmd};
use deadpool_redis::{Config as PoolSettings, Pool, PoolConfig, Runtime, Timeouts};
use sluice_messaging::stream_client::StreamClient;
use sluice_messaging::{Error, Message, StartPosition};
use tracing::debug;

use crate::config::RedisConfig;

/// A stream client backed by Redis Streams over a pooled connection.
///
/// Blocking group reads hold their connection for the duration of the
/// wait, which is why operations borrow from a bounded pool instead of
/// sharing one multiplexed connection.
#[derive(Clone, Debug)]
pub struct RedisStreamClient {
    pool: Pool,
}

impl RedisStreamClient {
    /// Builds the client and its connection pool from `config`.
    pub fn new(config: &RedisConfig) -> Result<Self, Error> {
        let mut settings = PoolSettings::from_url(connection_url(config));
        settings.pool = Some(pool_config(config));
        let pool = settings
            .create_pool(Some(Runtime::Tokio1))
            .map_err(Error::connection)?;

        Ok(Self { pool })
    }

    /// Round-trips a `PING`, verifying a connection can be established.
    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Error::connection)?;
        Ok(())
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, Error> {
        self.pool.get().await.map_err(Error::connection)
    }
}

fn connection_url(config: &RedisConfig) -> String {
    if config.network == "unix" {
        format!("redis+unix://{}", config.addr)
    } else {
        format!("redis://{}", config.addr)
    }
}

fn pool_config(config: &RedisConfig) -> PoolConfig {
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = PoolConfig::new(config.max_active.max(1));
    let mut timeouts = Timeouts::default();
    timeouts.create = Some(timeout);
    timeouts.recycle = Some(timeout);
    // An exhausted pool either parks the borrower or fails it immediately.
    timeouts.wait = if config.wait {
        None
    } else {
        Some(Duration::ZERO)
    };
    pool_config.timeouts = timeouts;
    pool_config
}

#[async_trait]
impl StreamClient for RedisStreamClient {
    async fn append(
        &self,
        topic: &str,
        max_len: usize,
        key: &str,
        value: &str,
    ) -> Result<String, Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic"));
        }
        if key.is_empty() {
            return Err(Error::InvalidArgument("key"));
        }

        let mut conn = self.connection().await?;
        let id: String = cmd("XADD")
            .arg(topic)
            .arg("MAXLEN")
            .arg("~")
            .arg(max_len)
            .arg("*")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(Error::connection)?;

        Ok(id)
    }

    async fn ensure_group(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic"));
        }
        if group.is_empty() {
            return Err(Error::InvalidArgument("group"));
        }

        let mut conn = self.connection().await?;
        let mut create = cmd("XGROUP");
        create.arg("CREATE").arg(topic).arg(group);
        match start {
            StartPosition::NewOnly => create.arg("$"),
            StartPosition::Offset(offset) => create.arg(offset),
        };
        create.arg("MKSTREAM");

        let created: Result<(), _> = create.query_async(&mut conn).await;
        match created {
            Ok(()) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => {
                debug!("group {} already exists on {}", group, topic);
                Ok(())
            }
            Err(err) => Err(Error::connection(err)),
        }
    }

    async fn read_new(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Vec<Message>, Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic"));
        }
        if group.is_empty() {
            return Err(Error::InvalidArgument("group"));
        }
        if consumer.is_empty() {
            return Err(Error::InvalidArgument("consumer"));
        }

        let block_ms = u64::try_from(block.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self.connection().await?;
        let reply: Value = cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(topic)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(Error::connection)?;

        if matches!(reply, Value::Nil) {
            return Err(Error::NoMessage);
        }
        decode_read_reply(reply)
    }

    async fn read_pending(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Vec<Message>, Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic"));
        }
        if group.is_empty() {
            return Err(Error::InvalidArgument("group"));
        }
        if consumer.is_empty() {
            return Err(Error::InvalidArgument("consumer"));
        }

        let mut conn = self.connection().await?;
        let reply: Value = cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("STREAMS")
            .arg(topic)
            .arg("0")
            .query_async(&mut conn)
            .await
            .map_err(Error::connection)?;

        if matches!(reply, Value::Nil) {
            return Ok(Vec::new());
        }
        decode_read_reply(reply)
    }

    async fn ack(&self, topic: &str, group: &str, id: &str) -> Result<u64, Error> {
        if topic.is_empty() {
            return Err(Error::InvalidArgument("topic"));
        }
        if group.is_empty() {
            return Err(Error::InvalidArgument("group"));
        }
        if id.is_empty() {
            return Err(Error::InvalidArgument("id"));
        }

        let mut conn = self.connection().await?;
        let acked: u64 = cmd("XACK")
            .arg(topic)
            .arg(group)
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(Error::connection)?;

        Ok(acked)
    }
}

// `XREADGROUP` replies with one name/entries pair per topic read; reads here
// are always single-topic:
// [[topic, [[id, [key, value]], ...]]]
fn decode_read_reply(reply: Value) -> Result<Vec<Message>, Error> {
    let Value::Array(topics) = reply else {
        return Err(Error::MalformedReply(
            "expected an array of topic entries".to_string(),
        ));
    };
    let Some(topic_entry) = topics.into_iter().next() else {
        return Err(Error::NoMessage);
    };
    let Value::Array(topic_entry) = topic_entry else {
        return Err(Error::MalformedReply(
            "expected a name/entries pair".to_string(),
        ));
    };
    let Ok([_name, entries]) = <[Value; 2]>::try_from(topic_entry) else {
        return Err(Error::MalformedReply(
            "topic entry is not a name/entries pair".to_string(),
        ));
    };
    let Value::Array(entries) = entries else {
        return Err(Error::MalformedReply(
            "expected an array of stream entries".to_string(),
        ));
    };

    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Array(parts) = entry else {
            return Err(Error::MalformedReply(
                "expected an id/fields pair".to_string(),
            ));
        };
        let Ok([id, fields]) = <[Value; 2]>::try_from(parts) else {
            return Err(Error::MalformedReply(
                "stream entry is not an id/fields pair".to_string(),
            ));
        };
        let Value::Array(fields) = fields else {
            return Err(Error::MalformedReply(
                "expected an array of entry fields".to_string(),
            ));
        };
        let Ok([key, value]) = <[Value; 2]>::try_from(fields) else {
            return Err(Error::MalformedReply(
                "entry fields are not a single key/value pair".to_string(),
            ));
        };

        messages.push(Message {
            id: string_value(id)?,
            key: string_value(key)?,
            value: string_value(value)?,
        });
    }

    Ok(messages)
}

fn string_value(value: Value) -> Result<String, Error> {
    match value {
        Value::BulkString(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(text) => Ok(text),
        other => Err(Error::MalformedReply(format!(
            "expected a string value, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(text: &str) -> Value {
        Value::BulkString(text.as_bytes().to_vec())
    }

    fn read_reply(entries: Vec<Value>) -> Value {
        Value::Array(vec![Value::Array(vec![bulk("orders"), Value::Array(entries)])])
    }

    #[test]
    fn decodes_a_well_formed_reply() {
        let reply = read_reply(vec![
            Value::Array(vec![
                bulk("1-0"),
                Value::Array(vec![bulk("k1"), bulk("v1")]),
            ]),
            Value::Array(vec![
                bulk("2-0"),
                Value::Array(vec![bulk("k2"), bulk("v2")]),
            ]),
        ]);

        let messages = decode_read_reply(reply).unwrap();

        assert_eq!(
            messages,
            vec![
                Message {
                    id: "1-0".to_string(),
                    key: "k1".to_string(),
                    value: "v1".to_string(),
                },
                Message {
                    id: "2-0".to_string(),
                    key: "k2".to_string(),
                    value: "v2".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_entry_list_decodes_to_no_messages() {
        let messages = decode_read_reply(read_reply(Vec::new())).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn empty_topic_list_is_no_message() {
        let result = decode_read_reply(Value::Array(Vec::new()));
        assert!(matches!(result, Err(Error::NoMessage)));
    }

    #[test]
    fn rejects_a_topic_entry_that_is_not_a_pair() {
        let reply = Value::Array(vec![Value::Array(vec![bulk("orders")])]);
        assert!(matches!(
            decode_read_reply(reply),
            Err(Error::MalformedReply(_))
        ));
    }

    #[test]
    fn rejects_entry_fields_that_are_not_a_single_pair() {
        let reply = read_reply(vec![Value::Array(vec![
            bulk("1-0"),
            Value::Array(vec![bulk("k1"), bulk("v1"), bulk("extra")]),
        ])]);
        assert!(matches!(
            decode_read_reply(reply),
            Err(Error::MalformedReply(_))
        ));
    }

    #[test]
    fn rejects_non_string_fields() {
        let reply = read_reply(vec![Value::Array(vec![
            bulk("1-0"),
            Value::Array(vec![Value::Int(1), bulk("v1")]),
        ])]);
        assert!(matches!(
            decode_read_reply(reply),
            Err(Error::MalformedReply(_))
        ));
    }

    #[test]
    fn tcp_and_unix_addresses_map_to_urls() {
        let mut config = local_config();
        assert_eq!(connection_url(&config), "redis://127.0.0.1:6379");

        config.network = "unix".to_string();
        config.addr = "/var/run/redis.sock".to_string();
        assert_eq!(connection_url(&config), "redis+unix:///var/run/redis.sock");
    }

    #[test]
    fn wait_flag_selects_pool_exhaustion_behavior() {
        let mut config = local_config();
        config.max_active = 8;

        let waiting = pool_config(&config);
        assert_eq!(waiting.max_size, 8);
        assert_eq!(waiting.timeouts.wait, None);

        config.wait = false;
        let failing = pool_config(&config);
        assert_eq!(failing.timeouts.wait, Some(Duration::ZERO));
    }

    #[test]
    fn zero_max_active_still_yields_a_usable_pool() {
        let mut config = local_config();
        config.max_active = 0;
        assert_eq!(pool_config(&config).max_size, 1);
    }

    fn local_config() -> RedisConfig {
        RedisConfig {
            addr: "127.0.0.1:6379".to_string(),
            network: "tcp".to_string(),
            timeout_ms: 1000,
            max_idle: 4,
            idle_timeout_ms: 30_000,
            max_active: 16,
            wait: true,
        }
    }
}
