use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_NOTIFICATION_BACKEND: &str = "log";
const DEFAULT_RESTOCK_LOCATION_TYPE: &str = "STORAGE";
const DEFAULT_COUNT_TOLERANCE_PCT: f64 = 5.0;
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_warehouse_ops";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// HS256 secret shared with the identity provider
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    /// Expected `aud` claim
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,

    /// Lifetime of tokens minted by the service itself (seconds)
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Request timeout applied to the whole router (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Redis connection URL used by the redis notification backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Notification transport: "log" or "redis"
    #[serde(default = "default_notification_backend")]
    #[validate(custom = "validate_notification_backend")]
    pub notification_backend: String,

    /// Base URL of the external fulfillment platform; sync disabled when unset
    #[serde(default)]
    pub fulfillment_platform_url: Option<String>,

    /// Bearer token sent to the fulfillment platform
    #[serde(default)]
    pub fulfillment_platform_token: Option<String>,

    /// Outbound fulfillment request timeout (seconds)
    #[serde(default = "default_fulfillment_timeout_secs")]
    pub fulfillment_timeout_secs: u64,

    /// Cycle count tolerance applied when a campaign does not set one (percent)
    #[serde(default = "default_count_tolerance_pct")]
    #[validate(custom = "validate_tolerance")]
    pub default_count_tolerance_pct: f64,

    /// Location type that receives restocked return items
    #[serde(default = "default_restock_location_type")]
    #[validate(custom = "validate_restock_location_type")]
    pub restock_location_type: String,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_audience: default_jwt_audience(),
            jwt_expiration: default_jwt_expiration(),
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            redis_url: default_redis_url(),
            notification_backend: default_notification_backend(),
            fulfillment_platform_url: None,
            fulfillment_platform_token: None,
            fulfillment_timeout_secs: default_fulfillment_timeout_secs(),
            default_count_tolerance_pct: default_count_tolerance_pct(),
            restock_location_type: default_restock_location_type(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    /// Default cycle count tolerance as a percentage
    pub fn count_tolerance(&self) -> Decimal {
        Decimal::from_f64_retain(self.default_count_tolerance_pct)
            .map(|d| d.round_dp(2))
            .unwrap_or_else(|| Decimal::new(5, 0))
    }

    /// Location type that receives restocked return units
    pub fn restock_location(&self) -> crate::models::location::LocationType {
        self.restock_location_type
            .parse()
            .unwrap_or(crate::models::location::LocationType::Returns)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_jwt_issuer() -> String {
    "warehouse-identity".to_string()
}

fn default_jwt_audience() -> String {
    "warehouse-api".to_string()
}

fn default_jwt_expiration() -> u64 {
    3600
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_notification_backend() -> String {
    DEFAULT_NOTIFICATION_BACKEND.to_string()
}

fn default_fulfillment_timeout_secs() -> u64 {
    10
}

fn default_count_tolerance_pct() -> f64 {
    DEFAULT_COUNT_TOLERANCE_PCT
}

fn default_restock_location_type() -> String {
    DEFAULT_RESTOCK_LOCATION_TYPE.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

fn validate_notification_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "log" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("notification_backend");
            err.message = Some("Must be one of: log, redis".into());
            Err(err)
        }
    }
}

fn validate_tolerance(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 || value > 100.0 {
        let mut err = ValidationError::new("default_count_tolerance_pct");
        err.message = Some("Tolerance must be between 0 and 100 percent".into());
        return Err(err);
    }
    Ok(())
}

fn validate_restock_location_type(value: &str) -> Result<(), ValidationError> {
    if value.parse::<crate::models::location::LocationType>().is_err() {
        let mut err = ValidationError::new("restock_location_type");
        err.message = Some("Unknown location type".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("warehouse_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://warehouse.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?;
    }

    let config = builder
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://warehouse.db?mode=memory".into(),
            "a_distinct_and_sufficiently_long_secret_value_0123456789".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://warehouse.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn tolerance_converts_to_decimal() {
        let mut cfg = base_config();
        cfg.default_count_tolerance_pct = 2.5;
        assert_eq!(cfg.count_tolerance(), Decimal::new(25, 1));
    }

    #[test]
    fn rejects_out_of_range_tolerance_and_empty_event_channel() {
        let mut cfg = base_config();
        cfg.default_count_tolerance_pct = 150.0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_config();
        cfg.event_channel_capacity = 0;
        assert!(cfg.validate().is_err());

        assert!(validate_tolerance(5.0).is_ok());
        assert!(validate_event_channel_capacity(1).is_ok());
    }

    #[test]
    fn rejects_unknown_notification_backend() {
        let mut cfg = base_config();
        cfg.notification_backend = "carrier-pigeon".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_file_overrides() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("development.toml")).unwrap();
        writeln!(
            file,
            "port = 9191\nrestock_location_type = \"RETURNS\"\ndefault_count_tolerance_pct = 3.0"
        )
        .unwrap();

        let cfg = load_config_from(dir.path(), "development").unwrap();
        assert_eq!(cfg.port, 9191);
        assert_eq!(cfg.restock_location_type, "RETURNS");
        assert_eq!(cfg.count_tolerance(), Decimal::new(3, 0));
    }
}
