//! NATS client wrapper with lazy connection

use crate::{metrics::NATS_CONNECTION_STATUS, Error, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// NATS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Connection name reported to the server
    pub name: String,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Max age of messages kept in streams created by this client
    pub stream_max_age: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            name: "message-bus".to_string(),
            connect_timeout: Duration::from_secs(5),
            stream_max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// NATS client, connected on first use
pub struct NatsClient {
    config: NatsConfig,
    connection: OnceCell<async_nats::Client>,
}

impl NatsClient {
    /// Create new client (does not connect)
    pub fn new(config: NatsConfig) -> Self {
        Self {
            config,
            connection: OnceCell::new(),
        }
    }

    /// Client configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Connected core NATS client
    pub async fn client(&self) -> Result<async_nats::Client> {
        let client = self
            .connection
            .get_or_try_init(|| async {
                info!("Connecting to NATS at {}", self.config.url);
                let result = async_nats::ConnectOptions::new()
                    .name(self.config.name.clone())
                    .connection_timeout(self.config.connect_timeout)
                    .connect(self.config.url.as_str())
                    .await;

                match result {
                    Ok(client) => {
                        NATS_CONNECTION_STATUS.with_label_values(&["connected"]).inc();
                        info!("✅ Connected to NATS: {}", self.config.url);
                        Ok(client)
                    }
                    Err(e) => {
                        NATS_CONNECTION_STATUS.with_label_values(&["failed"]).inc();
                        error!("Failed to connect to NATS {}: {}", self.config.url, e);
                        Err(Error::Connection(e.to_string()))
                    }
                }
            })
            .await?;

        Ok(client.clone())
    }

    /// JetStream context over the shared connection
    pub async fn jetstream(&self) -> Result<jetstream::Context> {
        Ok(jetstream::new(self.client().await?))
    }

    /// Ensure a work-queue stream exists for the given subjects
    pub async fn get_or_create_stream(
        &self,
        name: &str,
        subjects: Vec<String>,
    ) -> Result<jetstream::stream::Stream> {
        let js = self.jetstream().await?;

        let config = StreamConfig {
            name: name.to_string(),
            subjects,
            max_age: self.config.stream_max_age,
            ..Default::default()
        };

        js.get_or_create_stream(config)
            .await
            .map_err(|e| Error::JetStream(format!("stream {}: {}", name, e)))
    }
}
