//! Sensorcast relay
//!
//! Run with: cargo run -- --config config.toml
//!
//! Without `--config` the usual locations are searched (see [`Config::load_default`])
//! and the built-in reference deployment is used if none exists. A config
//! file that fails to load stops startup.
//! `RUST_LOG` overrides the configured log level.

use anyhow::Context;
use clap::Parser;
use sensorcast::api::{serve, shutdown_signal, AppState};
use sensorcast::config::{generate_default_config, Config, LoggingConfig};
use sensorcast::sink::{run_sink, DocumentBuilder, ElasticsearchConfig, ElasticsearchSink};
use sensorcast::telemetry::{Aggregator, DeviceClassifier, DeviceStateStore, Pipeline};
use sensorcast::transport::MqttIngress;
use sensorcast::websocket::ConnectionHub;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sensorcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relays home sensor telemetry to live viewers")]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a commented default config and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };

    init_tracing(&config.logging);

    tracing::info!("Starting Sensorcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        devices = config.devices.allow.len(),
        rooms = config.zones.rooms.len(),
        grid = config.zones.active_grid().is_some(),
        "Configuration loaded"
    );

    // Shared state
    let hub = Arc::new(ConnectionHub::new(config.hub_config()));
    let store = Arc::new(RwLock::new(DeviceStateStore::new()));
    let zones = Arc::new(config.zone_engine());
    let aggregator = Arc::new(Aggregator::new(config.aggregation_config()));
    let classifier = config.topic_classifier();

    // Transport → pipeline queue
    let (tx, rx) = mpsc::channel(config.mqtt.queue_size);
    let mut ingress = MqttIngress::new(config.transport_config(), tx);

    // Optional analytics sink on its own queue
    let sink_task = if config.sink.enabled {
        tracing::info!(url = %config.sink.url, index = %config.sink.index, "Analytics sink enabled");

        let (sink_tx, sink_rx) = mpsc::channel(config.sink.queue_size);
        ingress = ingress.with_tap(sink_tx);

        let sink = ElasticsearchSink::new(ElasticsearchConfig {
            url: config.sink.url.clone(),
            index: config.sink.index.clone(),
            ..Default::default()
        })
        .context("Failed to create analytics sink")?;
        let builder = DocumentBuilder::new(
            config.topic_layout(),
            DeviceClassifier::new(config.devices.rules.clone()),
            config.sink.persist_unknown,
        );

        Some(tokio::spawn(run_sink(sink_rx, sink, builder)))
    } else {
        tracing::info!("Analytics sink disabled");
        None
    };

    let pipeline = Pipeline::new(
        classifier.clone(),
        Arc::clone(&store),
        Arc::clone(&zones),
        Arc::clone(&aggregator),
        config.devices.occupancy_properties.clone(),
    );
    let pipeline_task = tokio::spawn(pipeline.run(rx, Arc::clone(&hub)));
    let ticker_task = Arc::clone(&aggregator).start_background_tick();
    let ingress_task = ingress.start();

    let state = AppState::new(
        Arc::clone(&hub),
        store,
        zones,
        aggregator,
        Arc::new(classifier),
    );

    // Viewers are dropped as soon as shutdown starts
    let shutdown_hub = Arc::clone(&hub);
    let shutdown = async move {
        shutdown_signal().await;
        shutdown_hub.close_all().await;
    };

    let result = serve(state, &config.api, shutdown).await;

    tracing::info!("Stopping background tasks");
    ingress_task.abort();
    ticker_task.abort();
    pipeline_task.abort();
    if let Some(task) = sink_task {
        task.abort();
    }

    result.context("API server failed")?;
    tracing::info!("Sensorcast stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    let json = logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}
