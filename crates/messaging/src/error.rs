use thiserror::Error;

/// Errors produced by stream client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was empty.
    #[error("invalid argument: {0} cannot be empty")]
    InvalidArgument(&'static str),

    /// A blocking read timed out with nothing available.
    #[error("no message available")]
    NoMessage,

    /// The backing store's reply did not match the expected shape.
    #[error("malformed reply from backing store: {0}")]
    MalformedReply(String),

    /// The backing store could not be reached, or refused the command.
    #[error("backing store connection failed")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary backend failure into [`Error::Connection`].
    pub fn connection<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection(Box::new(source))
    }
}
