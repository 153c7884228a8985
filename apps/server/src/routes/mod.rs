use actix_web::web;

mod devices;
mod events;
mod health;
pub mod metrics;

pub use devices::devices_route;
pub use events::events_route;
pub use health::health_route;
pub use metrics::metrics_route;

/// Every route of the main server
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_route)
        .service(devices_route)
        .service(events_route)
        .service(metrics_route);
}

/// Routes of the metrics-only server
pub fn metrics_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_route).service(metrics_route);
}
