//! Abstract interface and core machinery for at-least-once messaging over
//! consumer-group streams.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Consumers poll a topic under a consumer group and dispatch to a handler.
pub mod consumer;

/// Errors shared by all stream client implementations.
pub mod error;

/// Message handlers process messages dispatched by consumers.
pub mod handler;

/// Dead letter mailboxes receive messages that exhausted their retry budget.
pub mod mailbox;

/// Messages are key/value entries with a store-assigned identity.
pub mod message;

/// Producers publish messages onto a topic with bounded retention.
pub mod producer;

/// Stream clients translate queue operations into store commands.
pub mod stream_client;

pub use error::Error;
pub use message::{Message, StartPosition};
