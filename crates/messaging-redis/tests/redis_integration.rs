//! Round-trip tests against a real Redis at 127.0.0.1:6379.
//!
//! Ignored by default; run with `cargo test -- --ignored` with a local
//! server available.

use std::time::Duration;

use serial_test::serial;
use sluice_messaging::stream_client::StreamClient;
use sluice_messaging::{Error, StartPosition};
use sluice_messaging_redis::{RedisConfig, RedisStreamClient};
use uuid::Uuid;

fn local_client() -> RedisStreamClient {
    RedisStreamClient::new(&RedisConfig {
        addr: "127.0.0.1:6379".to_string(),
        network: "tcp".to_string(),
        timeout_ms: 1300,
        max_idle: 4,
        idle_timeout_ms: 30_000,
        max_active: 8,
        wait: true,
    })
    .unwrap()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}:{}", Uuid::new_v4())
}

#[tokio::test]
#[serial]
#[ignore = "requires a local redis server"]
async fn ping_round_trips() {
    local_client().ping().await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a local redis server"]
async fn append_read_ack_round_trips() {
    let client = local_client();
    let topic = unique("topic");
    let group = unique("group");

    client
        .ensure_group(&topic, &group, StartPosition::NewOnly)
        .await
        .unwrap();

    let id = client.append(&topic, 1000, "k1", "v1").await.unwrap();

    let batch = client
        .read_new(&topic, &group, "c1", Duration::from_millis(1000))
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].key, "k1");
    assert_eq!(batch[0].value, "v1");

    let pending = client.read_pending(&topic, &group, "c1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);

    let acked = client.ack(&topic, &group, &id).await.unwrap();
    assert_eq!(acked, 1);

    let pending = client.read_pending(&topic, &group, "c1").await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires a local redis server"]
async fn blocking_read_times_out_on_an_idle_topic() {
    let client = local_client();
    let topic = unique("topic");
    let group = unique("group");

    client
        .ensure_group(&topic, &group, StartPosition::NewOnly)
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let result = client
        .read_new(&topic, &group, "c1", Duration::from_millis(200))
        .await;

    assert!(matches!(result, Err(Error::NoMessage)));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
#[serial]
#[ignore = "requires a local redis server"]
async fn ensure_group_tolerates_recreation() {
    let client = local_client();
    let topic = unique("topic");
    let group = unique("group");

    client
        .ensure_group(&topic, &group, StartPosition::NewOnly)
        .await
        .unwrap();
    client
        .ensure_group(&topic, &group, StartPosition::NewOnly)
        .await
        .unwrap();
}

// Argument validation happens before a connection is borrowed, so this
// holds with no server running.
#[tokio::test]
async fn empty_arguments_are_rejected_before_hitting_the_store() {
    let client = local_client();

    assert!(matches!(
        client.append("", 10, "k", "v").await,
        Err(Error::InvalidArgument("topic"))
    ));
    assert!(matches!(
        client
            .read_new("topic", "", "c1", Duration::from_millis(10))
            .await,
        Err(Error::InvalidArgument("group"))
    ));
    assert!(matches!(
        client.ack("topic", "group", "").await,
        Err(Error::InvalidArgument("id"))
    ));
}
