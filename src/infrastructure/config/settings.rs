use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::email::validation::validate_address;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub managed_api: ManagedApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

/// Background queue processor settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Maximum messages fetched per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between ticks in seconds
    #[serde(default = "default_processing_interval")]
    pub processing_interval_seconds: u64,
    /// Retry ceiling before a message is permanently failed
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base of the exponential backoff
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_minutes: u64,
    /// Ceiling on the computed backoff
    #[serde(default = "default_retry_delay_cap")]
    pub retry_delay_cap_minutes: u64,
    /// Messages processed concurrently within one batch (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_batch_size() -> usize {
    50
}

fn default_processing_interval() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    5
}

fn default_retry_delay_cap() -> u64 {
    120 // 2 hours
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Transport backend: "smtp", "api" or "log"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Default From address; required
    #[serde(default)]
    pub sender_address: String,
    pub sender_name: Option<String>,
}

fn default_provider() -> String {
    "log".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// "none", "starttls" or "tls"
    #[serde(default = "default_smtp_tls")]
    pub tls: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> String {
    "starttls".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedApiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_api_version() -> String {
    "2023-03-31".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

fn default_database_url() -> String {
    "postgres://localhost:5432/mailer".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesConfig {
    /// JSON file with templates loaded into the memory store at startup
    pub seed_file: Option<String>,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_sliding")]
    pub cache_sliding_seconds: u64,
    #[serde(default = "default_cache_absolute")]
    pub cache_absolute_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_sliding() -> u64 {
    300 // 5 minutes
}

fn default_cache_absolute() -> u64 {
    3600 // 1 hour
}

fn default_cache_max_entries() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("queue.batch_size", 50)?
            .set_default("queue.processing_interval_seconds", 30)?
            .set_default("queue.max_retry_attempts", 3)?
            .set_default("email.provider", "log")?
            .set_default("storage.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // MAILER_QUEUE__BATCH_SIZE, MAILER_SMTP__HOST, MAILER_EMAIL__SENDER_ADDRESS, ...
            .add_source(
                Environment::with_prefix("MAILER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.sender_address.trim().is_empty() {
            return Err(ConfigError::Message(
                "email.sender_address is required (MAILER_EMAIL__SENDER_ADDRESS)".to_string(),
            ));
        }
        validate_address(&self.email.sender_address).map_err(|e| {
            ConfigError::Message(format!("email.sender_address is invalid: {}", e))
        })?;
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            processing_interval_seconds: default_processing_interval(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_base_delay_minutes: default_retry_base_delay(),
            retry_delay_cap_minutes: default_retry_delay_cap(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            sender_address: String::new(),
            sender_name: None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            tls: default_smtp_tls(),
            username: None,
            password: None,
            timeout_seconds: default_smtp_timeout(),
        }
    }
}

impl Default for ManagedApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            api_version: default_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_seconds: default_poll_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            seed_file: None,
            cache_enabled: default_cache_enabled(),
            cache_sliding_seconds: default_cache_sliding(),
            cache_absolute_seconds: default_cache_absolute(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api: ApiConfig::default(),
            queue: QueueConfig::default(),
            email: EmailConfig::default(),
            smtp: SmtpConfig::default(),
            managed_api: ManagedApiConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            templates: TemplatesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
