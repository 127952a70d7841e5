use thiserror::Error;

/// Backend conditions specific to the in-memory store.
///
/// Surfaced through [`sluice_messaging::Error::Connection`], the same
/// bucket a real store's command errors land in.
#[derive(Debug, Error)]
pub enum MemoryStreamError {
    /// The consumer group does not exist on the topic.
    #[error("no such group {group} on topic {topic}")]
    NoSuchGroup {
        /// The topic that was read.
        topic: String,
        /// The missing group.
        group: String,
    },
}
