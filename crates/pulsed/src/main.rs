use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pulsed::Config;
use pulsed::Engine;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How long integrations get to log out before their tasks are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "pulsed")]
#[command(about = "ADT Pulse alarm panel and sensor daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "pulsed.toml")]
    config: PathBuf,
}

fn init_tracing(config: &Config) {
    let targets = config
        .logging
        .overrides
        .iter()
        .fold(
            Targets::new().with_default(LevelFilter::from(config.logging.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    init_tracing(&config);

    tracing::info!("pulsed starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!("Engine stopped with error: {}", e);
        }
    });

    let mut api_shutdown = None;
    let mut api_task = None;
    if let Some(api) = &config.api {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let listen = api.listen.clone();
        let port = api.port;
        let api_engine = engine.clone();
        api_shutdown = Some(tx);
        api_task = Some(tokio::spawn(async move {
            if let Err(e) = pulsed::api::serve(listen, port, api_engine, rx).await {
                tracing::error!("HTTP API server failed: {}", e);
            }
        }));
    }

    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    if let Some(tx) = api_shutdown {
        let _ = tx.send(());
    }
    if let Some(task) = api_task {
        let _ = task.await;
    }

    tracing::info!("Shutting down integrations...");
    engine.shutdown(SHUTDOWN_GRACE).await;
    engine_task.abort();

    tracing::info!("pulsed shutdown complete");

    Ok(())
}
