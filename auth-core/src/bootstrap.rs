use std::sync::Arc;

use service_core::error::AppError;
use service_core::observability::init_tracing;

use crate::config::AuthConfig;
use crate::db::Database;
use crate::services::AuthService;

/// A ready-to-use service backed by Postgres.
pub struct Bootstrapped {
    pub config: AuthConfig,
    pub database: Database,
    pub auth: AuthService,
}

/// Load configuration, install logging, connect, migrate, verify the
/// default permission codes and wire the services. Fails fast on any step.
pub async fn bootstrap() -> Result<Bootstrapped, AppError> {
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.common.service_name,
        &config.common.log_level,
        config.common.log_format,
    );

    tracing::info!(
        service = %config.common.service_name,
        environment = ?config.environment,
        "Starting auth core"
    );

    let database = Database::connect(&config.database).await?;
    database.run_migrations().await?;
    database.health_check().await?;
    database
        .check_permission_codes(&config.settings.default_permissions)
        .await?;

    let auth = AuthService::from_store(Arc::new(database.store()), config.settings.clone());

    tracing::info!("Auth core initialized");

    Ok(Bootstrapped {
        config,
        database,
        auth,
    })
}
