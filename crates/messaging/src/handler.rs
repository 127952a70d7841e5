use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::message::Message;

/// A callback invoked for each message a consumer dispatches.
#[async_trait]
pub trait MessageHandler
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: StdError + Send + Sync + 'static;

    /// Handles the given message.
    ///
    /// An `Err` return (or exceeding the consumer's handler timeout) counts
    /// as a failed delivery attempt; the message stays unacknowledged and is
    /// redelivered until it succeeds or exhausts its retry budget.
    async fn handle(&self, message: Message) -> Result<(), Self::Error>;
}
