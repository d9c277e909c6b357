//! SMPP transport worker binary

use anyhow::Context;
use message_bus::{NatsClient, NatsConfig, NatsFabric, PublisherConfig, SubscriberConfig};
use smpp_transport::session::{LoopbackSmsc, SimulatorConfig};
use smpp_transport::store::RedisStore;
use smpp_transport::{SmppTransport, TransportConfig, SERVICE_NAME};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting {}", SERVICE_NAME);

    // Load configuration
    let mut config = match std::env::var("SMPP_TRANSPORT_CONFIG") {
        Ok(path) => TransportConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => TransportConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;

    let store = RedisStore::connect(&config.redis.url, config.redis.db)
        .await
        .context("connecting to Redis")?;

    let client = Arc::new(NatsClient::new(NatsConfig {
        url: config.nats.url.clone(),
        name: format!("{}-{}", SERVICE_NAME, config.transport_name),
        ..Default::default()
    }));
    let durable_name: String = config
        .transport_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let fabric = NatsFabric::new(
        client,
        PublisherConfig {
            use_jetstream: config.nats.use_jetstream,
            ..Default::default()
        },
        SubscriberConfig {
            durable_name: format!("smpp_transport_{}", durable_name),
            use_jetstream: config.nats.use_jetstream,
            ..Default::default()
        },
    );

    // The wire protocol lives outside this crate; the loopback SMSC stands in for it
    tracing::warn!("⚠️ Using loopback SMSC session, submissions do not leave this process");
    let connector = LoopbackSmsc::new(SimulatorConfig::passive());

    let mut transport = SmppTransport::new(
        &config,
        Arc::new(connector),
        Arc::new(store),
        Arc::new(fabric),
    );
    transport.start().await?;

    transport
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    transport.stop().await?;
    tracing::info!("Shutting down {}", SERVICE_NAME);
    Ok(())
}
