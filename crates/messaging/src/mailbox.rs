use std::fmt::Debug;

use async_trait::async_trait;
use tracing::error;

use crate::message::Message;

/// A sink for messages that exhausted their retry budget.
///
/// The consumer holds its mailbox as a trait object and never inspects
/// which implementation it was given; one instance may be shared across
/// consumers.
#[async_trait]
pub trait DeadLetterMailbox
where
    Self: Debug + Send + Sync + 'static,
{
    /// Delivers an exhausted message to the mailbox.
    async fn deliver(
        &self,
        message: &Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The default mailbox: records the escalation and always succeeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeadLetterLogger;

impl DeadLetterLogger {
    /// Creates a new logging mailbox.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeadLetterMailbox for DeadLetterLogger {
    async fn deliver(
        &self,
        message: &Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        error!(
            "message exceeded retry limit, id: {}, key: {}",
            message.id, message.key
        );
        Ok(())
    }
}
