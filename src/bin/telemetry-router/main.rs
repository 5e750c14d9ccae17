mod args;

use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use env_telemetry::{
    db::{PgSink, migrate, new_pool},
    listener::PersistenceListeners,
    mqtt::MqttListener,
    push::PushHub,
    router::TopicRouter,
    store::{MemoryStore, RealtimeStore},
};
use tokio::sync::{broadcast::error::RecvError, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let pool = new_pool(&args.database_url)
        .await
        .context("failed to create database pool")?;

    if args.migrate {
        migrate(&pool).await?;
        info!("database migrations applied");
    }

    let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
    let sink = Arc::new(PgSink::new(pool));
    let hub = PushHub::new();

    let listeners = Arc::new(PersistenceListeners::new(
        Arc::clone(&store),
        sink,
        Duration::from_secs(args.sink_timeout_secs),
    ));

    let router = Arc::new(
        TopicRouter::new(args.main_topic, store, Arc::new(hub.connect()))
            .with_listeners(listeners),
    );

    let mut events = hub.listen();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = %event.name, value = event.value, "push event"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "push log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut mqtt = MqttListener::new(
        &args.mqtt_host,
        args.mqtt_port,
        Duration::from_secs(args.mqtt_keep_alive_secs),
        router,
    );
    info!(host = %args.mqtt_host, port = args.mqtt_port, "connecting to broker");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mqtt_task = tokio::spawn(async move { mqtt.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    let _ = shutdown_tx.send(());
    mqtt_task.await.context("MQTT listener task failed")?;

    Ok(())
}
