//! Message publisher with retry logic

use crate::{
    client::NatsClient,
    message::Message,
    metrics::{MESSAGE_PUBLISH_DURATION, MESSAGE_PUBLISH_TOTAL},
    Error, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Enable JetStream persistence
    pub use_jetstream: bool,

    /// Max publish attempts (1 disables retrying)
    pub max_retry_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            use_jetstream: true,
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Message publisher
pub struct Publisher {
    client: Arc<NatsClient>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create new publisher
    pub fn new(client: Arc<NatsClient>, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    /// Publish message on its routing key
    pub async fn publish(&self, message: &Message) -> Result<()> {
        let start = Instant::now();
        let stream = message.routing_key.stream_name();

        debug!("Publishing message {} to subject: {}", message.id, message.subject());

        let payload = message.to_bytes()?;
        let result = self.publish_with_retry(message, &payload).await;

        let duration = start.elapsed().as_secs_f64();
        MESSAGE_PUBLISH_DURATION
            .with_label_values(&[stream.as_str()])
            .observe(duration);

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[stream.as_str(), status])
            .inc();

        result
    }

    /// Publish with exponential backoff retry
    async fn publish_with_retry(&self, message: &Message, payload: &[u8]) -> Result<()> {
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.publish_once(message, payload).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("✅ Message {} published after {} attempts", message.id, attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= self.config.max_retry_attempts.max(1) {
                        error!(
                            "❌ Failed to publish {} after {} attempts: {}",
                            message.id, attempts, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "⚠️  Publish failed (attempt {}), retrying in {:?}: {}",
                        attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;

                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    /// Single publish attempt
    async fn publish_once(&self, message: &Message, payload: &[u8]) -> Result<()> {
        let subject = message.subject().to_string();

        if self.config.use_jetstream {
            let js = self.client.jetstream().await?;

            // Ensure stream exists
            self.client
                .get_or_create_stream(
                    &message.routing_key.stream_name(),
                    message.routing_key.stream_subjects(),
                )
                .await?;

            let ack = js
                .publish(subject, bytes::Bytes::copy_from_slice(payload))
                .await
                .map_err(|e| Error::Publish(e.to_string()))?;

            ack.await
                .map_err(|e| Error::JetStream(format!("Publish ack failed: {}", e)))?;
        } else {
            let client = self.client.client().await?;

            client
                .publish(subject, bytes::Bytes::copy_from_slice(payload))
                .await
                .map_err(|e| Error::Publish(e.to_string()))?;

            client
                .flush()
                .await
                .map_err(|e| Error::Publish(format!("Flush failed: {}", e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NatsConfig;

    #[tokio::test]
    async fn test_publisher_creation() {
        let client = Arc::new(NatsClient::new(NatsConfig::default()));
        let publisher = Publisher::new(client, PublisherConfig::default());
        assert!(publisher.config.use_jetstream);
    }

    #[test]
    fn test_publish_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(100));
    }
}
