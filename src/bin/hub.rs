use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sensorhub::{
    analytics::AnalyticsEngine,
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{Config, read_config_file},
    feed::spawn_simulated_feed,
    registry::ConnectionRegistry,
    source::{MemorySource, SampleSource},
};
use sensorhub::actors::{broadcaster::BroadcastHandle, heartbeat::HeartbeatHandle};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sensorhub", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
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
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let source = match &config.dataset {
        Some(path) => {
            info!("preloading dataset from {}", path.display());
            Arc::new(MemorySource::from_json_file(path)?)
        }
        None => Arc::new(MemorySource::new()),
    };

    let mut feed_task = None;
    if let Some(feed) = config.feed.clone() {
        feed_task = Some(spawn_simulated_feed(source.clone(), feed));
    }

    let registry = Arc::new(ConnectionRegistry::new());

    let broadcast = BroadcastHandle::spawn(
        source.clone(),
        registry.clone(),
        Duration::from_secs(config.broadcast_interval_secs),
        config.window_len,
    );

    let heartbeat = HeartbeatHandle::spawn(
        registry.clone(),
        broadcast.clone(),
        Duration::from_secs(config.heartbeat_interval_secs),
        Duration::from_secs(config.heartbeat_timeout_secs),
    );

    let analytics = Arc::new(AnalyticsEngine::new(
        source.clone() as Arc<dyn SampleSource>,
        config.analytics.clone(),
    ));

    let state = ApiState::new(
        registry,
        broadcast.clone(),
        heartbeat.clone(),
        analytics,
        source.clone() as Arc<dyn SampleSource>,
    );

    let api_config = ApiConfig {
        bind_addr: config.bind_addr,
        enable_cors: config.enable_cors,
    };
    let addr = spawn_api_server(api_config, state).await?;
    info!("sensor hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(task) = feed_task {
        task.abort();
    }
    if let Err(e) = heartbeat.shutdown().await {
        error!("heartbeat shutdown failed: {e}");
    }
    if let Err(e) = broadcast.shutdown().await {
        error!("broadcaster shutdown failed: {e}");
    }

    Ok(())
}
