mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, EmailConfig, LoggingConfig, ManagedApiConfig, QueueConfig,
    ServerConfig, Settings, SmtpConfig, StorageConfig, TemplatesConfig,
};
