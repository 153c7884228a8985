use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lanwatch::{DeviceStore, Engine, EventHub, EventSink};
use lanwatch_server::{AppState, run_metrics_server, run_server};
use tracing::{error, info};

mod cli;
mod config;
mod database;
mod pool;
mod validation;

use cli::Cli;
use config::Config;
use database::LibsqlStore;

/// Time granted to a running sweep to notice the stop request
const SCAN_STOP_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref())?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    info!(
        sections = config.sections.len(),
        networks = config.networks.len(),
        database = %config.database.path.display(),
        "Starting lanwatch"
    );

    let pool = pool::open_pool(&config.database.path).await?;
    {
        let conn = pool.get().await.map_err(|e| anyhow::anyhow!("could not get a database connection: {e}"))?;
        database::initialize_database(&conn).await.context("database migration failed")?;
    }

    let store: Arc<dyn DeviceStore> = Arc::new(LibsqlStore::new_from_pool(pool.clone()));
    let hub = EventHub::new(config.discovery.event_buffer);
    let events: Arc<dyn EventSink> = Arc::new(hub.clone());

    let engine = Engine::new(config.engine_config(), store.clone(), events)?;
    engine.start().await?;

    let bind: IpAddr = config.web.bind.parse().context("invalid web.bind address")?;
    let state = AppState::new(store, hub);

    let server = run_server(SocketAddr::new(bind, config.web.port), state.clone())?;
    let mut handles = vec![server.handle()];
    let mut servers = vec![tokio::spawn(server)];

    if let Some(port) = config.web.metrics_port {
        let metrics = run_metrics_server(SocketAddr::new(bind, port), state)?;
        handles.push(metrics.handle());
        servers.push(tokio::spawn(metrics));
    }

    tokio::signal::ctrl_c().await.context("could not listen for shutdown signal")?;
    info!("Shutting down...");

    engine.shutdown(SCAN_STOP_GRACE).await;
    for handle in handles {
        handle.stop(true).await;
    }
    for server in servers {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP server failed: {e}"),
            Err(e) => error!("HTTP server task failed: {e}"),
        }
    }

    drop(pool);
    info!("Shutdown complete");
    Ok(())
}
