use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{Message, StartPosition};

/// A client translating queue-level operations into backing-store commands.
///
/// Durability and ordering are guarantees of the backing store, not of this
/// trait; implementations only shape the command surface consumer groups
/// need.
#[async_trait]
pub trait StreamClient
where
    Self: Send + Sync + 'static,
{
    /// Appends a key/value pair to `topic`, trimming the topic to
    /// approximately `max_len` most-recent entries, and returns the assigned
    /// message id.
    async fn append(
        &self,
        topic: &str,
        max_len: usize,
        key: &str,
        value: &str,
    ) -> Result<String, Error>;

    /// Idempotently creates `group` on `topic`, creating the topic if
    /// absent. Re-creating an existing group is not an error.
    async fn ensure_group(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
    ) -> Result<(), Error>;

    /// Blocking read of new, unclaimed messages for `consumer`, waiting up
    /// to `block`. Returns [`Error::NoMessage`] when the wait elapses with
    /// nothing available.
    async fn read_new(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Vec<Message>, Error>;

    /// Non-blocking read of messages already claimed by `consumer` but not
    /// yet acknowledged.
    async fn read_pending(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Vec<Message>, Error>;

    /// Marks a message delivered for `group` and returns the number of
    /// entries acknowledged.
    async fn ack(&self, topic: &str, group: &str, id: &str) -> Result<u64, Error>;
}
