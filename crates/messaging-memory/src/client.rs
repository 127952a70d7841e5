use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sluice_messaging::stream_client::StreamClient;
use sluice_messaging::{Error, Message, StartPosition};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::error::MemoryStreamError;

#[derive(Debug, Default)]
struct TopicState {
    // Last assigned sequence number; ids are `{seq}-0`.
    last_seq: u64,
    entries: VecDeque<(u64, Message)>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    // Next sequence this group will deliver to a `>` read.
    cursor: u64,
    // Claimed but unacknowledged entries, ordered by sequence.
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    message: Message,
}

/// An in-memory stream client with consumer-group semantics.
#[derive(Clone, Debug, Default)]
pub struct MemoryStreamClient {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
    appended: Arc<Notify>,
}

impl MemoryStreamClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently retained for `topic`.
    pub async fn topic_len(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map_or(0, |state| state.entries.len())
    }

    /// The entries currently retained for `topic`, oldest first.
    pub async fn entries(&self, topic: &str) -> Vec<Message> {
        self.topics.lock().await.get(topic).map_or_else(Vec::new, |state| {
            state
                .entries
                .iter()
                .map(|(_, message)| message.clone())
                .collect()
        })
    }

    fn sequence_of(id: &str) -> Option<u64> {
        id.split('-').next()?.parse().ok()
    }
}

#[async_trait]
impl StreamClient for MemoryStreamClient {
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

        let id = {
            let mut topics = self.topics.lock().await;
            let state = topics.entry(topic.to_string()).or_default();
            state.last_seq += 1;
            let seq = state.last_seq;
            let id = format!("{seq}-0");

            state.entries.push_back((
                seq,
                Message {
                    id: id.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                },
            ));
            while state.entries.len() > max_len {
                state.entries.pop_front();
            }

            id
        };

        self.appended.notify_waiters();
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

        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        let cursor = match start {
            StartPosition::NewOnly => state.last_seq + 1,
            StartPosition::Offset(offset) => offset + 1,
        };
        state
            .groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                cursor,
                pending: BTreeMap::new(),
            });

        Ok(())
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

        let deadline = Instant::now() + block;
        loop {
            // Register interest before checking state so an append between
            // the check and the wait still wakes this reader.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut topics = self.topics.lock().await;
                let group_state = topics
                    .get_mut(topic)
                    .and_then(|state| {
                        let TopicState {
                            entries, groups, ..
                        } = state;
                        groups.get_mut(group).map(|g| (entries, g))
                    })
                    .ok_or_else(|| {
                        Error::connection(MemoryStreamError::NoSuchGroup {
                            topic: topic.to_string(),
                            group: group.to_string(),
                        })
                    });

                let (entries, group_state) = group_state?;
                let cursor = group_state.cursor;
                let mut batch = Vec::new();
                for (seq, message) in entries.iter().filter(|(seq, _)| *seq >= cursor) {
                    batch.push(message.clone());
                    group_state.pending.insert(
                        *seq,
                        PendingEntry {
                            consumer: consumer.to_string(),
                            message: message.clone(),
                        },
                    );
                    group_state.cursor = seq + 1;
                }
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::NoMessage);
            }
        }
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

        let topics = self.topics.lock().await;
        let group_state = topics
            .get(topic)
            .and_then(|state| state.groups.get(group))
            .ok_or_else(|| {
                Error::connection(MemoryStreamError::NoSuchGroup {
                    topic: topic.to_string(),
                    group: group.to_string(),
                })
            })?;

        Ok(group_state
            .pending
            .values()
            .filter(|entry| entry.consumer == consumer)
            .map(|entry| entry.message.clone())
            .collect())
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

        let Some(seq) = Self::sequence_of(id) else {
            return Ok(0);
        };

        let mut topics = self.topics.lock().await;
        let removed = topics
            .get_mut(topic)
            .and_then(|state| state.groups.get_mut(group))
            .and_then(|group_state| group_state.pending.remove(&seq));

        Ok(u64::from(removed.is_some()))
    }
}
