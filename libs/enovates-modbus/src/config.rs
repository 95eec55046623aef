//! Client configuration
//!
//! Values are layered (lowest to highest priority):
//! 1. Built-in defaults
//! 2. Optional config file (`.yaml`/`.yml`, `.toml` or `.json`)
//! 3. Environment variables prefixed with `ENO_` (e.g. `ENO_HOST`, `ENO_UNIT_ID`)

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ENO_";

/// Standard Modbus TCP port
pub const DEFAULT_PORT: u16 = 502;

/// The charger exposes a single unit
pub const DEFAULT_UNIT_ID: u8 = 1;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_unit_id() -> u8 {
    DEFAULT_UNIT_ID
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Connection settings for one charger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Hostname or IP address of the charger
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit id (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Per-exchange timeout, also applied to connecting
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Refuse every accessor except the version ones until the API version
    /// check has passed on the current connection
    #[serde(default)]
    pub enforce_version_check: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            enforce_version_check: false,
        }
    }
}

impl ClientConfig {
    /// Configuration for `host:port` with defaults for everything else
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Layered provider stack: defaults, optional file, `ENO_` environment
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));

        if let Some(path) = path {
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::config("Config file must have an extension"))?;

            figment = match extension {
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => {
                    return Err(Error::config(format!(
                        "Unsupported config file format: {}",
                        extension
                    )))
                },
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: ClientConfig = Self::figment(path)?.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("port must not be 0"));
        }
        if !(1..=247).contains(&self.unit_id) {
            return Err(Error::config(format!(
                "unit_id {} out of range (1-247)",
                self.unit_id
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve `host:port` to the first socket address
    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        let target = format!("{}:{}", self.host, self.port);
        let addr = tokio::net::lookup_host(&target).await?.next();
        addr.ok_or_else(|| Error::config(format!("{} did not resolve to any address", target)))
    }
}
