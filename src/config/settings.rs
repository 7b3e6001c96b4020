//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Push channel endpoint
    pub push: PushSettings,

    /// Reconnect backoff policy
    pub reconnect: ReconnectSettings,

    /// Notification ledger configuration
    pub notifications: NotificationSettings,

    /// Transient UI event configuration
    pub transient: TransientSettings,

    /// Local persistence (wishlist and other identifier sets)
    pub storage: StorageSettings,

    /// HTTP collaborator configuration
    pub http: HttpSettings,

    /// Session credential used by the binary
    #[serde(default)]
    pub session: SessionSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSettings {
    /// WebSocket URL of the realtime endpoint (e.g., "ws://localhost:4000/realtime")
    pub url: String,

    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectSettings {
    /// Delay before the first reconnect attempt in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds
    pub max_delay_ms: u64,

    /// Symmetric jitter factor (0.0-1.0)
    pub jitter_factor: f64,
}

/// Notification store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Maximum number of notifications kept in the push-delivered list
    pub capacity: usize,

    /// Offer unread arrivals to the platform alerter
    pub platform_alerts: bool,
}

/// Transient event queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransientSettings {
    /// Time-to-live of a transient UI event in milliseconds
    pub ttl_ms: u64,
}

/// Local key-value storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory holding one JSON file per stored key
    pub data_dir: String,
}

/// HTTP collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Base URL that endpoint paths are joined onto
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Session configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSettings {
    /// Opaque session token; usually supplied via SESSION_TOKEN
    pub token: Option<String>,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. Built-in defaults
    /// 2. config/default.toml (base configuration)
    /// 3. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 4. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Self::builder(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__PUSH__URL=ws://... -> push.url
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("push.url", std::env::var("PUSH_URL").ok())?
            .set_override_option("session.token", std::env::var("SESSION_TOKEN").ok())?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    /// Settings made of built-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder("development")?
            .build()?
            .try_deserialize()
            .and_then(Self::validate)
    }

    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("push.url", "ws://localhost:4000/realtime")?
            .set_default("push.max_message_size", 65536_i64)?
            .set_default("reconnect.base_delay_ms", 1000_i64)?
            .set_default("reconnect.max_delay_ms", 30000_i64)?
            .set_default("reconnect.jitter_factor", 0.2)?
            .set_default("notifications.capacity", 10_i64)?
            .set_default("notifications.platform_alerts", true)?
            .set_default("transient.ttl_ms", 3000_i64)?
            .set_default("storage.data_dir", ".course-sync")?
            .set_default("http.base_url", "http://localhost:4000/api")?
            .set_default("http.timeout_secs", 15_i64)
    }

    fn validate(settings: Self) -> Result<Self, ConfigError> {
        if settings.notifications.capacity == 0 {
            return Err(ConfigError::Message(
                "notifications.capacity must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&settings.reconnect.jitter_factor) {
            return Err(ConfigError::Message(format!(
                "reconnect.jitter_factor must be within 0.0..=1.0, got {}",
                settings.reconnect.jitter_factor
            )));
        }
        if settings.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Message(
                "reconnect.base_delay_ms must be positive".into(),
            ));
        }
        Ok(settings)
    }
}

impl TransientSettings {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ttl_ms)
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}
