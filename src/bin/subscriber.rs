use std::sync::Arc;

use anyhow::Context;
use aviary_monitoring::{
    actors::{forwarder::ForwarderPool, ingest::IngestHandle, subscriber::SubscriberHandle},
    config,
    forwarder::HttpForwarder,
};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults plus environment overrides when omitted)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("aviary_monitoring", LevelFilter::DEBUG),
        ("aviary_subscriber", LevelFilter::TRACE),
        ("rumqttc", LevelFilter::WARN),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = config::load(args.file.as_deref())?;

    let forwarder = HttpForwarder::new(&config.forwarder)?;
    info!("forwarding readings to {}", forwarder.url());

    let pool = ForwarderPool::spawn(Arc::new(forwarder), &config.forwarder);
    let ingest = IngestHandle::spawn(
        &config.assembler,
        pool.handle(),
        config.mqtt.channel_capacity,
    );
    let subscriber = SubscriberHandle::spawn(&config.mqtt, ingest.message_sender());

    info!(
        "subscribed to {} on {}:{}",
        config.mqtt.topic, config.mqtt.broker, config.mqtt.port
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    // stop at the source first so nothing new enters the pipeline
    if let Err(e) = subscriber.shutdown().await {
        warn!("subscriber did not stop cleanly: {e:#}");
    }

    match ingest.stats().await {
        Ok(stats) => info!("ingest totals: {stats:?}"),
        Err(e) => warn!("could not read ingest stats: {e:#}"),
    }
    if let Err(e) = ingest.shutdown().await {
        warn!("ingest actor did not stop cleanly: {e:#}");
    }
    drop(ingest);

    let stats = pool.shutdown().await;
    info!(
        "forwarded {} readings, dropped {}",
        stats.forwarded,
        stats.dropped()
    );

    Ok(())
}
