// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use parley_common::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default config file looked up next to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";
/// Prefix for environment overrides, e.g. `PARLEY_JWT_SECRET`
pub const ENV_PREFIX: &str = "PARLEY_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Root directory of the flat-file store
    pub data_dir: PathBuf,
    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// HMAC secret used to verify (and mint) credentials
    pub jwt_secret: String,
    /// Clock skew tolerated when checking `exp`
    pub token_leeway_secs: u64,
    /// Roles admitted to the realtime endpoint
    pub realtime_roles: Vec<Role>,
    /// Roles a `startChat` counterpart may hold
    pub counterpart_roles: Vec<Role>,
    /// CORS origins; empty means any origin
    pub allowed_origins: Vec<String>,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Failed handshakes per IP before lockout
    pub max_failed_handshakes: u32,
    /// Lockout duration after too many failed handshakes
    pub lockout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_json: false,
            jwt_secret: String::new(),
            token_leeway_secs: 0,
            realtime_roles: vec![Role::User, Role::Admin],
            counterpart_roles: vec![Role::User, Role::Admin],
            allowed_origins: vec!["http://localhost:3000".to_string()],
            outbound_buffer: 64,
            max_failed_handshakes: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl Settings {
    /// Load settings from defaults, `parley.toml` and `PARLEY_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings using an explicit config file path.
    ///
    /// A missing file is not an error; defaults and the environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Self::figment(path.as_ref())
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt_secret must be set".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be positive".into()));
        }
        if self.realtime_roles.is_empty() {
            return Err(ConfigError::Invalid("realtime_roles must not be empty".into()));
        }
        if self.counterpart_roles.is_empty() {
            return Err(ConfigError::Invalid("counterpart_roles must not be empty".into()));
        }
        if self.max_failed_handshakes == 0 {
            return Err(ConfigError::Invalid(
                "max_failed_handshakes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config/config_tests.rs"]
mod config_tests;
