//! Database layer
//!
//! libsql (SQLite) persistence for monitored and discovered devices, exposed
//! to the engine as a [`lanwatch::DeviceStore`].

pub mod migrations;
pub mod repository;

pub use repository::LibsqlStore;

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
