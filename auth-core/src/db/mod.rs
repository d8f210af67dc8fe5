//! PostgreSQL pool for the auth store.

use std::str::FromStr;
use std::time::{Duration, Instant};

use service_core::error::AppError;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::store::PgStore;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Connection pool plus the startup checks the auth schema needs.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect using `config`. The URL is parsed first so a malformed one is
    /// reported as configuration, not as a connection failure.
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is invalid: {}", e)))?;

        // Credentials stay out of the log.
        info!(
            host = options.get_host(),
            port = options.get_port(),
            database = options.get_database().unwrap_or("<default>"),
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A store sharing this pool.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Apply the users, tokens and permissions schema.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Auth schema is up to date");
        Ok(())
    }

    /// Round trip to the server; returns how long it took.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<Duration, AppError> {
        let started = Instant::now();
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        let latency = started.elapsed();
        info!(latency_ms = latency.as_millis() as u64, "Database reachable");
        Ok(latency)
    }

    /// Every code in `codes` must have a permission definition. Registration
    /// grants these to each new user, so a missing one would fail every
    /// sign-up.
    #[instrument(skip(self))]
    pub async fn check_permission_codes(&self, codes: &[String]) -> Result<(), AppError> {
        let known: Vec<String> =
            sqlx::query_scalar("SELECT code FROM permissions WHERE code = ANY($1)")
                .bind(codes)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let missing: Vec<&str> = codes
            .iter()
            .filter(|code| !known.contains(*code))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_PERMISSIONS contains undefined codes: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}
