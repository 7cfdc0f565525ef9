//! Demonstration gateway built on `pdumux`.
//!
//! Loads a JSON configuration, binds the configured sockets and logs every
//! PDU routed to a consumer until interrupted.

mod cli;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use pdumux::{
    GatewayConfig,
    RxEngine,
    gateway::{Gateway, GatewayTransport, LoggingConsumer},
    route::Contract,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
    }

    let config = GatewayConfig::load(&cli.config)?;
    let (transport, events) = GatewayTransport::channel();
    let mut builder = RxEngine::builder(config.clone()).transport(Arc::new(transport));
    for (name, contract) in config.consumer_names() {
        let consumer = Arc::new(LoggingConsumer::new(name.clone()));
        builder = match contract {
            Contract::Streaming => builder.streaming_consumer(name, consumer),
            Contract::FireAndForget => builder.fire_and_forget_consumer(name, consumer),
        };
    }
    let engine = Arc::new(builder.build()?);

    let shutdown = CancellationToken::new();
    let gateway = Gateway::new(engine, shutdown.clone());
    gateway.bind().await?;
    gateway.spawn_event_handler(events);
    gateway.spawn_driver(Duration::from_millis(cli.drive_interval_ms));

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    gateway.wait().await;
    Ok(())
}
