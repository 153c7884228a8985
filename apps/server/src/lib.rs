#![warn(clippy::all, clippy::pedantic)]

//! HTTP front end for the Lanwatch engine.
//!
//! Servers are returned bound but not yet polled: the caller spawns them and keeps
//! their [`ServerHandle`](actix_web::dev::ServerHandle) for graceful shutdown.
//! Process signals are left to the caller.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server, web};
use lanwatch::{DeviceStore, EventHub};
use tracing::info;

mod error;
pub mod routes;

pub use error::AppError;

/// Seconds granted to in-flight requests on graceful stop
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeviceStore>,
    pub hub: EventHub,
}

impl AppState {
    pub fn new(store: Arc<dyn DeviceStore>, hub: EventHub) -> Self {
        Self { store, hub }
    }
}

/// Bind the main server: health, device API, event stream and metrics
pub fn run_server(addr: SocketAddr, state: AppState) -> Result<Server, AppError> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
        .bind(addr)?
        .disable_signals()
        .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
        .run();

    info!(%addr, "HTTP server listening");
    Ok(server)
}

/// Bind a metrics-only server for scrapers on a separate port
pub fn run_metrics_server(addr: SocketAddr, state: AppState) -> Result<Server, AppError> {
    let data = web::Data::new(state);
    let server =
        HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::metrics_routes))
            .bind(addr)?
            .workers(1)
            .disable_signals()
            .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS)
            .run();

    info!(%addr, "Metrics server listening");
    Ok(server)
}
