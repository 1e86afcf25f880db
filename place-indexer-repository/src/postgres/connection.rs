//! PostgreSQL connection setup for the gazetteer database.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::errors::GazetteerError;

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters of the gazetteer database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GazetteerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "nominatim".to_string(),
            user: "nominatim".to_string(),
            password: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl GazetteerConfig {
    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .application_name("place-indexer");

        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}

/// Connect to the gazetteer and return a connection pool.
pub async fn connect(config: &GazetteerConfig) -> Result<PgPool, GazetteerError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(config.connect_options())
        .await?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        max_connections = config.max_connections,
        "Connected to gazetteer database"
    );

    Ok(pool)
}
