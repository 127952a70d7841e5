/// A single entry read from a topic.
///
/// Identity for acknowledgement and retry accounting is the store-assigned
/// `id`, never the key/value payload: two messages carrying identical
/// payloads are still distinct deliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned stream identifier.
    pub id: String,

    /// Application key.
    pub key: String,

    /// Application value.
    pub value: String,
}

/// Where a newly created consumer group begins reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartPosition {
    /// Only messages appended after group creation are visible.
    NewOnly,

    /// Start after an explicit stream offset; `Offset(0)` reads the topic
    /// from the beginning.
    Offset(u64),
}
