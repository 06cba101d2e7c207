//! Configuration management

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::constants::{DEFAULT_BACKEND_ADDRESS, DEFAULT_SESSION_LIFETIME, MAX_RECORD_TTL};

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    /// host:port of the key-value backend
    pub address: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreSettings {
    /// Optional prefix placed in front of every record key.
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    pub default_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl SessionSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings { address: DEFAULT_BACKEND_ADDRESS.to_string() },
            store: StoreSettings::default(),
            session: SessionSettings { default_ttl_secs: DEFAULT_SESSION_LIFETIME.as_secs() },
            log: LogSettings { format: LogFormat::Json },
        }
    }
}

impl StoreConfig {
    /// Loads defaults, then `config/default` and `config/<APP_ENV>`, then
    /// `IDENTITY__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("IDENTITY").separator("__").try_parsing(true))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let cfg: Self = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The default session lifetime must be non-zero and within `MAX_RECORD_TTL`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.session.default_ttl();
        if ttl.is_zero() || ttl > MAX_RECORD_TTL {
            return Err(ConfigError::Message(format!(
                "session.default_ttl_secs must be between 1 and {}, got {}",
                MAX_RECORD_TTL.as_secs(),
                self.session.default_ttl_secs
            )));
        }
        Ok(())
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("backend.address", DEFAULT_BACKEND_ADDRESS)?
            .set_default("session.default_ttl_secs", DEFAULT_SESSION_LIFETIME.as_secs() as i64)?
            .set_default("log.format", "json")
    }
}
