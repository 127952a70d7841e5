use std::sync::Arc;

use crate::error::Error;
use crate::stream_client::StreamClient;

const DEFAULT_QUEUE_LEN: usize = 500;

/// Options for a producer.
#[derive(Clone, Copy, Debug)]
pub struct ProducerOptions {
    /// Maximum number of entries a topic retains; older entries are trimmed
    /// away on publish. Zero is repaired to the default of 500.
    pub max_queue_len: usize,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            max_queue_len: DEFAULT_QUEUE_LEN,
        }
    }
}

impl ProducerOptions {
    fn repair(mut self) -> Self {
        if self.max_queue_len == 0 {
            self.max_queue_len = DEFAULT_QUEUE_LEN;
        }
        self
    }
}

/// Publishes key/value messages onto topics with bounded retention.
#[derive(Debug)]
pub struct Producer<C> {
    client: Arc<C>,
    options: ProducerOptions,
}

impl<C> Clone for Producer<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            options: self.options,
        }
    }
}

impl<C> Producer<C>
where
    C: StreamClient,
{
    /// Creates a new producer over `client`, repairing invalid options.
    pub fn new(client: Arc<C>, options: ProducerOptions) -> Self {
        Self {
            client,
            options: options.repair(),
        }
    }

    /// Publishes one message and returns the store-assigned id.
    ///
    /// Failures surface directly to the caller; there are no internal
    /// retries. Topics exceeding the retention bound drop their oldest
    /// entries, which is a storage bound rather than an error.
    pub async fn publish(&self, topic: &str, key: &str, value: &str) -> Result<String, Error> {
        self.client
            .append(topic, self.options.max_queue_len, key, value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::message::{Message, StartPosition};

    #[derive(Debug, Default)]
    struct RecordingClient {
        appends: Mutex<Vec<(String, usize, String, String)>>,
    }

    #[async_trait]
    impl StreamClient for RecordingClient {
        async fn append(
            &self,
            topic: &str,
            max_len: usize,
            key: &str,
            value: &str,
        ) -> Result<String, Error> {
            let mut appends = self.appends.lock().unwrap();
            appends.push((
                topic.to_string(),
                max_len,
                key.to_string(),
                value.to_string(),
            ));
            Ok(format!("{}-0", appends.len()))
        }

        async fn ensure_group(
            &self,
            _topic: &str,
            _group: &str,
            _start: StartPosition,
        ) -> Result<(), Error> {
            Ok(())
        }

        async fn read_new(
            &self,
            _topic: &str,
            _group: &str,
            _consumer: &str,
            _block: Duration,
        ) -> Result<Vec<Message>, Error> {
            Err(Error::NoMessage)
        }

        async fn read_pending(
            &self,
            _topic: &str,
            _group: &str,
            _consumer: &str,
        ) -> Result<Vec<Message>, Error> {
            Ok(Vec::new())
        }

        async fn ack(&self, _topic: &str, _group: &str, _id: &str) -> Result<u64, Error> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn publish_uses_configured_retention() {
        let client = Arc::new(RecordingClient::default());
        let producer = Producer::new(client.clone(), ProducerOptions { max_queue_len: 42 });

        let id = producer.publish("orders", "k1", "v1").await.unwrap();

        assert_eq!(id, "1-0");
        let appends = client.appends.lock().unwrap();
        assert_eq!(
            appends[0],
            (
                "orders".to_string(),
                42,
                "k1".to_string(),
                "v1".to_string()
            )
        );
    }

    #[tokio::test]
    async fn zero_queue_len_is_repaired_to_default() {
        let client = Arc::new(RecordingClient::default());
        let producer = Producer::new(client.clone(), ProducerOptions { max_queue_len: 0 });

        producer.publish("orders", "k1", "v1").await.unwrap();

        assert_eq!(client.appends.lock().unwrap()[0].1, 500);
    }
}
