use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use service_core::config as core_config;
use service_core::error::AppError;

use crate::models::permission::MOVIES_READ;
use crate::store::DEFAULT_STORE_TIMEOUT;
use crate::utils::PasswordConfig;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub settings: AuthSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Lifetimes of each token scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    pub activation_ttl: Duration,
    pub authentication_ttl: Duration,
    pub password_reset_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            activation_ttl: Duration::days(3),
            authentication_ttl: Duration::hours(24),
            password_reset_ttl: Duration::minutes(45),
        }
    }
}

/// Everything the services need at runtime, independent of where the
/// values came from.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub store_timeout: StdDuration,
    pub password: PasswordConfig,
    pub tokens: TokenConfig,
    /// Granted to every newly registered user.
    pub default_permissions: Vec<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            password: PasswordConfig::default(),
            tokens: TokenConfig::default(),
            default_permissions: vec![MOVIES_READ.to_string()],
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "25", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            settings: AuthSettings {
                store_timeout: StdDuration::from_millis(parse_env(
                    "STORE_TIMEOUT_MS",
                    "3000",
                    is_prod,
                )?),
                password: PasswordConfig {
                    memory_kib: parse_env("PASSWORD_MEMORY_KIB", "19456", is_prod)?,
                    iterations: parse_env("PASSWORD_ITERATIONS", "2", is_prod)?,
                    parallelism: parse_env("PASSWORD_PARALLELISM", "1", is_prod)?,
                },
                tokens: TokenConfig {
                    activation_ttl: ttl(
                        "ACTIVATION_TOKEN_TTL_HOURS",
                        parse_env("ACTIVATION_TOKEN_TTL_HOURS", "72", is_prod)?,
                        Duration::try_hours,
                    )?,
                    authentication_ttl: ttl(
                        "AUTHENTICATION_TOKEN_TTL_HOURS",
                        parse_env("AUTHENTICATION_TOKEN_TTL_HOURS", "24", is_prod)?,
                        Duration::try_hours,
                    )?,
                    password_reset_ttl: ttl(
                        "PASSWORD_RESET_TOKEN_TTL_MINUTES",
                        parse_env("PASSWORD_RESET_TOKEN_TTL_MINUTES", "45", is_prod)?,
                        Duration::try_minutes,
                    )?,
                },
                default_permissions: get_env("DEFAULT_PERMISSIONS", Some(MOVIES_READ), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        self.settings.validate()
    }
}

impl AuthSettings {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.store_timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_MS must be positive"
            )));
        }

        if self.password.memory_kib == 0
            || self.password.iterations == 0
            || self.password.parallelism == 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_* cost parameters must be positive"
            )));
        }

        let ttls = [
            ("ACTIVATION_TOKEN_TTL_HOURS", self.tokens.activation_ttl),
            ("AUTHENTICATION_TOKEN_TTL_HOURS", self.tokens.authentication_ttl),
            ("PASSWORD_RESET_TOKEN_TTL_MINUTES", self.tokens.password_reset_ttl),
        ];
        for (key, ttl) in ttls {
            if ttl <= Duration::zero() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be positive",
                    key
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?.parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
    })
}

/// Convert a configured count into a duration, rejecting values chrono
/// cannot represent.
fn ttl(key: &str, value: i64, unit: fn(i64) -> Option<Duration>) -> Result<Duration, AppError> {
    unit(value).ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("{} is out of range", key)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
