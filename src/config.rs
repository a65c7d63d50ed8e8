use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{KitMergeStatus, KitMergeType};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_REFRESH_PATH: &str = "auth/refresh";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_KIT_MERGE_PAGE_LIMIT: u64 = 1;
const DEFAULT_MATERIAL_CODE_MIN_LEN: usize = 6;
const DEFAULT_REFETCH_DELAY_MS: u64 = 500;
const DEFAULT_STALE_AFTER_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the WCS/IWMS REST API
    #[validate(url)]
    pub api_base_url: String,

    /// Path of the token refresh endpoint, relative to the base URL
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Fixed per-request timeout in seconds (1s - 5min)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Outbound gate this kiosk serves
    #[serde(default)]
    pub gate: Option<String>,

    /// Kit-merge batch type handled at the gate
    #[serde(default)]
    pub kit_type: KitMergeType,

    /// Kit-merge status considered active
    #[serde(default)]
    pub kit_status: KitMergeStatus,

    /// Page size when looking up the active batch; the first result wins
    #[serde(default = "default_kit_merge_page_limit")]
    #[validate(range(min = 1, max = 2))]
    pub kit_merge_page_limit: u64,

    /// Scans longer than this many characters are material codes
    #[serde(default = "default_material_code_min_len")]
    #[validate(range(min = 1, max = 64))]
    pub material_code_min_len: usize,

    /// Delay before re-fetching after a material scan (milliseconds)
    #[serde(default = "default_refetch_delay_ms")]
    pub refetch_delay_ms: u64,

    /// Age after which the fetched snapshot is considered stale (seconds)
    #[serde(default = "default_stale_after_secs")]
    #[validate(range(min = 1))]
    pub stale_after_secs: u64,

    /// Idle poll tick (seconds)
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Capacity of the operator notice channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Session file holding the bearer tokens
    #[serde(default)]
    pub session_file: Option<String>,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the API location.
    pub fn new(api_base_url: String, environment: String) -> Self {
        Self {
            api_base_url,
            refresh_path: default_refresh_path(),
            request_timeout_secs: default_request_timeout_secs(),
            gate: None,
            kit_type: KitMergeType::default(),
            kit_status: KitMergeStatus::default(),
            kit_merge_page_limit: default_kit_merge_page_limit(),
            material_code_min_len: default_material_code_min_len(),
            refetch_delay_ms: default_refetch_delay_ms(),
            stale_after_secs: default_stale_after_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            session_file: None,
            environment,
            log_level: default_log_level(),
            log_json: false,
        }
    }

    /// Checks if running in production
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && !self.api_base_url.starts_with("https://") {
            let mut err = ValidationError::new("api_base_url_https_required");
            err.message = Some(
                "APP__API_BASE_URL must use https outside development; bearer tokens travel with every request".into(),
            );
            errors.add("api_base_url", err);
        }

        if self.refresh_path.trim().is_empty() {
            let mut err = ValidationError::new("refresh_path_empty");
            err.message = Some("refresh_path must not be empty".into());
            errors.add("refresh_path", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refetch_delay(&self) -> Duration {
        Duration::from_millis(self.refetch_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_kit_merge_page_limit() -> u64 {
    DEFAULT_KIT_MERGE_PAGE_LIMIT
}

fn default_material_code_min_len() -> usize {
    DEFAULT_MATERIAL_CODE_MIN_LEN
}

fn default_refetch_delay_ms() -> u64 {
    DEFAULT_REFETCH_DELAY_MS
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn config_path(config_dir: &Path, name: &str) -> String {
    config_dir.join(name).to_string_lossy().into_owned()
}

/// Validates log level values
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

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("wms_ptl={},ptl_kiosk={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    // Logs go to stderr; stdout belongs to the kiosk display.
    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_writer(std::io::stderr)
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("refresh_path", DEFAULT_REFRESH_PATH)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&config_path(config_dir, "default")).required(false))
        .add_source(File::with_name(&config_path(config_dir, &run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    // The API location has no sane default; fail with a clear message instead of a serde error.
    if config.get_string("api_base_url").is_err() {
        error!("API base URL is not configured. Set APP__API_BASE_URL or api_base_url in config/default.toml.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "api_base_url is required but not configured. Set APP__API_BASE_URL environment variable."
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
