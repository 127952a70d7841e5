use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::handler::MessageHandler;
use crate::mailbox::{DeadLetterLogger, DeadLetterMailbox};
use crate::message::Message;
use crate::stream_client::StreamClient;

const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_MAX_RETRY_LIMIT: u32 = 3;
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_DEAD_LETTER_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from consumer construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required field was empty.
    #[error("invalid consumer config: {0} cannot be empty")]
    InvalidConfig(&'static str),
}

/// Options for a consumer, validated and defaulted once at construction.
///
/// Unset (or zero, which the backing store would read as "no limit") values
/// fall back to their defaults; nothing here can be changed after the
/// consumer is built.
#[derive(Clone, Debug, Default)]
pub struct ConsumerOptions {
    /// How long each blocking poll waits for new messages. Defaults to
    /// 2000 ms.
    pub receive_timeout: Option<Duration>,

    /// Consecutive failures after which a message escalates to the dead
    /// letter mailbox. Defaults to 3.
    pub max_retry_limit: Option<u32>,

    /// Budget for a single handler invocation; exceeding it counts as a
    /// failed attempt. Defaults to 1 s.
    pub handler_timeout: Option<Duration>,

    /// Budget for a single dead letter delivery. Defaults to 1 s.
    pub dead_letter_timeout: Option<Duration>,

    /// Mailbox receiving exhausted messages. Defaults to the logging
    /// mailbox.
    pub dead_letter_mailbox: Option<Arc<dyn DeadLetterMailbox>>,
}

#[derive(Clone, Debug)]
struct ResolvedOptions {
    receive_timeout: Duration,
    max_retry_limit: u32,
    handler_timeout: Duration,
    dead_letter_timeout: Duration,
    mailbox: Arc<dyn DeadLetterMailbox>,
}

impl ConsumerOptions {
    fn resolve(self) -> ResolvedOptions {
        ResolvedOptions {
            receive_timeout: duration_or(self.receive_timeout, DEFAULT_RECEIVE_TIMEOUT),
            max_retry_limit: match self.max_retry_limit {
                Some(limit) if limit > 0 => limit,
                _ => DEFAULT_MAX_RETRY_LIMIT,
            },
            handler_timeout: duration_or(self.handler_timeout, DEFAULT_HANDLER_TIMEOUT),
            dead_letter_timeout: duration_or(
                self.dead_letter_timeout,
                DEFAULT_DEAD_LETTER_TIMEOUT,
            ),
            mailbox: self
                .dead_letter_mailbox
                .unwrap_or_else(|| Arc::new(DeadLetterLogger::new())),
        }
    }
}

fn duration_or(value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(value) if !value.is_zero() => value,
        _ => default,
    }
}

/// A consumer-group poller dispatching messages to a handler.
///
/// Construction starts the background loop. The loop polls for new
/// messages, redelivers claimed-but-unacknowledged ones, tracks consecutive
/// failures per message id, and escalates exhausted messages to the dead
/// letter mailbox. Nothing inside the loop is fatal; it exits only through
/// [`shutdown`](Self::shutdown), and a stopped consumer cannot be
/// restarted.
#[derive(Debug)]
pub struct Consumer {
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Consumer {
    /// Validates the configuration and starts the polling loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<C, H>(
        client: Arc<C>,
        topic: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
        handler: H,
        options: ConsumerOptions,
    ) -> Result<Self, ConfigError>
    where
        C: StreamClient,
        H: MessageHandler,
    {
        let topic = topic.into();
        let group = group.into();
        let consumer_name = consumer_name.into();

        if topic.is_empty() {
            return Err(ConfigError::InvalidConfig("topic"));
        }
        if group.is_empty() {
            return Err(ConfigError::InvalidConfig("group"));
        }
        if consumer_name.is_empty() {
            return Err(ConfigError::InvalidConfig("consumer name"));
        }

        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        let poll_loop = PollLoop {
            client,
            topic,
            group,
            consumer_name,
            handler,
            options: options.resolve(),
            shutdown_token: shutdown_token.clone(),
            failures: HashMap::new(),
        };
        task_tracker.spawn(poll_loop.run());
        task_tracker.close();

        Ok(Self {
            shutdown_token,
            task_tracker,
        })
    }

    /// Requests cooperative shutdown and waits for the loop to exit.
    ///
    /// Cancellation is observed between iterations: an in-flight handler
    /// invocation or acknowledgement completes (or times out) first.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.task_tracker.wait().await;
    }

    /// Waits for the loop to exit without requesting shutdown.
    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }

    /// Whether the background loop has exited.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task_tracker.is_empty()
    }
}

struct FailureEntry {
    message: Message,
    count: u32,
}

struct PollLoop<C, H> {
    client: Arc<C>,
    topic: String,
    group: String,
    consumer_name: String,
    handler: H,
    options: ResolvedOptions,
    shutdown_token: CancellationToken,

    // Keyed by message id; owned exclusively by this loop, so no lock.
    failures: HashMap<String, FailureEntry>,
}

impl<C, H> PollLoop<C, H>
where
    C: StreamClient,
    H: MessageHandler,
{
    async fn run(mut self) {
        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let fresh = self.poll_new().await;
            self.dispatch(fresh).await;

            // Claimed-but-unacknowledged messages are redelivered until they
            // succeed or exhaust their retry budget.
            let pending = self.poll_pending().await;
            self.dispatch(pending).await;

            self.sweep_dead_letters().await;
        }

        debug!(
            "consumer {} on {}/{} stopped",
            self.consumer_name, self.topic, self.group
        );
    }

    async fn poll_new(&self) -> Vec<Message> {
        match self
            .client
            .read_new(
                &self.topic,
                &self.group,
                &self.consumer_name,
                self.options.receive_timeout,
            )
            .await
        {
            Ok(messages) => messages,
            Err(Error::NoMessage) => Vec::new(),
            Err(err) => {
                debug!("polling {} for new messages failed: {}", self.topic, err);
                Vec::new()
            }
        }
    }

    async fn poll_pending(&self) -> Vec<Message> {
        match self
            .client
            .read_pending(&self.topic, &self.group, &self.consumer_name)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                debug!(
                    "polling {} for pending messages failed: {}",
                    self.topic, err
                );
                Vec::new()
            }
        }
    }

    async fn dispatch(&mut self, messages: Vec<Message>) {
        for message in messages {
            let outcome = tokio::time::timeout(
                self.options.handler_timeout,
                self.handler.handle(message.clone()),
            )
            .await;

            match outcome {
                Ok(Ok(())) => {
                    // The handler already ran, so the message counts as
                    // handled even when the ack is lost; redelivery is
                    // governed by the pending path.
                    if let Err(err) = self
                        .client
                        .ack(&self.topic, &self.group, &message.id)
                        .await
                    {
                        warn!("ack failed for message {}: {}", message.id, err);
                    }
                    self.failures.remove(&message.id);
                }
                Ok(Err(err)) => {
                    debug!("handler failed for message {}: {}", message.id, err);
                    self.record_failure(message);
                }
                Err(_) => {
                    debug!("handler timed out for message {}", message.id);
                    self.record_failure(message);
                }
            }
        }
    }

    fn record_failure(&mut self, message: Message) {
        let entry = self
            .failures
            .entry(message.id.clone())
            .or_insert_with(|| FailureEntry { message, count: 0 });
        entry.count = entry.count.saturating_add(1);
    }

    async fn sweep_dead_letters(&mut self) {
        let mut exhausted: Vec<String> = self
            .failures
            .iter()
            .filter(|(_, entry)| entry.count >= self.options.max_retry_limit)
            .map(|(id, _)| id.clone())
            .collect();
        // Stable sweep order.
        exhausted.sort();

        for id in exhausted {
            let Some(entry) = self.failures.get(&id) else {
                continue;
            };

            let delivery = tokio::time::timeout(
                self.options.dead_letter_timeout,
                self.options.mailbox.deliver(&entry.message),
            )
            .await;

            match delivery {
                Ok(Ok(())) => {
                    // Ack the escalated message so it cannot reappear
                    // through the pending path and restart the count.
                    if let Err(err) = self.client.ack(&self.topic, &self.group, &id).await {
                        warn!("ack after dead letter delivery failed for {}: {}", id, err);
                    }
                    self.failures.remove(&id);
                    warn!(
                        "message {} escalated to dead letter mailbox on {}/{}",
                        id, self.topic, self.group
                    );
                }
                Ok(Err(err)) => {
                    error!("dead letter delivery failed for message {}: {}", id, err);
                }
                Err(_) => {
                    error!("dead letter delivery timed out for message {}", id);
                }
            }
        }
    }
}
