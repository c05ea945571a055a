pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub use transaction::unit_of_work;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Pool sizing and timeouts taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for PoolSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections.min(cfg.db_max_connections),
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl PoolSettings {
    fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url.clone());
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .sqlx_logging(false);
        opt
    }
}

/// Opens the warehouse store (Postgres or SQLite, chosen by the URL scheme).
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let settings = PoolSettings::from(cfg);
    debug!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "configuring warehouse store pool"
    );
    gauge!("warehouse_db.max_connections", f64::from(settings.max_connections));

    let pool = Database::connect(settings.connect_options())
        .await
        .map_err(|e| {
            error!(error = %e, "could not open warehouse store");
            ServiceError::DatabaseError(e)
        })?;

    info!(backend = ?pool.get_database_backend(), "warehouse store connected");
    Ok(pool)
}

/// Applies every pending schema migration.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    let applied = crate::migrator::Migrator::get_pending_migrations(pool)
        .await
        .map(|pending| pending.len())
        .unwrap_or_default();

    crate::migrator::Migrator::up(pool, None).await.map_err(|e| {
        error!(error = %e, elapsed = ?start.elapsed(), "schema migration failed");
        ServiceError::DatabaseError(e)
    })?;

    info!(applied, elapsed = ?start.elapsed(), "schema up to date");
    Ok(())
}

/// Pings the store; used by the health endpoint.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            gauge!(
                "warehouse_db.connection_latency",
                start.elapsed().as_secs_f64() * 1000.0
            );
            Ok(())
        }
        Err(e) => {
            counter!("warehouse_db.connection_failures", 1);
            error!(error = %e, "warehouse store ping failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}
