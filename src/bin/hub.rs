use anyhow::Context;
use aviary_monitoring::{
    actors::evaluator::EvaluatorHandle,
    api::{ApiState, spawn_api_server},
    config,
    evaluator::{AlertEvaluator, AlertPolicy},
    storage,
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
        ("aviary_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
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

    let storage = storage::open(&config.storage)
        .await
        .context("failed to open storage")?;

    let policy = AlertPolicy::from(&config.alerting);
    let evaluator = EvaluatorHandle::spawn(AlertEvaluator::new(storage.clone(), policy));

    let addr = spawn_api_server(&config.api, ApiState::new(storage.clone(), evaluator.clone()))
        .await
        .context("failed to start API server")?;
    info!("hub ready on http://{addr}/api/v1");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    evaluator.shutdown().await;
    if let Err(e) = storage.close().await {
        warn!("failed to close storage: {e}");
    }

    Ok(())
}
