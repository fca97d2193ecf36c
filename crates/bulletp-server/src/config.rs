//! Server configuration
//!
//! Defaults, then an optional TOML file named by `BULLETP_CONFIG`, then
//! individual environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bulletp_core::config::DEV_OTP_SECRET;
use bulletp_core::{BulletpConfig, ConfigError, DeleteMode};

const DEFAULT_DATABASE: &str = "bulletp.db";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ServerConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(ServerConfigError::InvalidVar {
                key: "ENV",
                value: other.to_string(),
            }),
        }
    }
}

/// Errors while assembling the server configuration
#[derive(Error, Debug)]
pub enum ServerConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidVar { key: &'static str, value: String },

    #[error(transparent)]
    Core(#[from] ConfigError),
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// SQLite file. Required in production.
    pub database_path: Option<PathBuf>,
    pub env: Environment,
    /// Origins allowed by CORS; `*` allows any
    pub cors_origins: Vec<String>,
    /// User scope applied when a request names none
    pub default_user: String,
    /// Mount `/api/dev/*`. Defaults to on in dev and off in prod.
    pub enable_dev_routes: Option<bool>,
    #[serde(flatten)]
    pub core: BulletpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            database_path: None,
            env: Environment::Dev,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            default_user: "default".to_string(),
            enable_dev_routes: None,
            core: BulletpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self, ServerConfigError> {
        Self::from_sources(|key| std::env::var(key).ok())
    }

    /// Load using `var` as the environment lookup
    pub fn from_sources(var: impl Fn(&str) -> Option<String>) -> Result<Self, ServerConfigError> {
        let mut config = match var("BULLETP_CONFIG").filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(path.trim())?,
            None => Self::default(),
        };
        config.apply_env(var)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ServerConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ServerConfigError> {
        let get = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BULLETP_ADDR") {
            self.addr = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("ENV") {
            self.env = v.parse()?;
        }
        if let Some(v) = get("OTP_SECRET") {
            self.core.otp.secret = v;
        }
        if let Some(v) = get("OTP_EXPIRE_SECONDS") {
            self.core.otp.expire_seconds = parse_number("OTP_EXPIRE_SECONDS", &v)?;
        }
        if let Some(v) = get("OTP_COOLDOWN_SECONDS") {
            self.core.otp.cooldown_seconds = parse_number("OTP_COOLDOWN_SECONDS", &v)?;
        }
        if let Some(v) = get("OTP_IP_LIMIT_PER_HOUR") {
            self.core.otp.ip_limit_per_hour = parse_number("OTP_IP_LIMIT_PER_HOUR", &v)?;
        }
        if let Some(v) = get("WECHAT_APPID") {
            self.core.oauth.wechat_appid = Some(v);
        }
        if let Some(v) = get("WECHAT_SECRET") {
            self.core.oauth.wechat_secret = Some(v);
        }
        if let Some(v) = get("WECHAT_REDIRECT_URI") {
            self.core.oauth.wechat_redirect_uri = Some(v);
        }
        if let Some(v) = get("BULLETP_DELETE_MODE") {
            self.core.tree.delete_mode = v.parse::<DeleteMode>()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        self.core.validate()?;
        if self.env == Environment::Prod {
            if self.database_path.is_none() {
                return Err(ConfigError::MissingField("DATABASE_PATH".to_string()).into());
            }
            if self.core.otp.secret == DEV_OTP_SECRET {
                return Err(ConfigError::Invalid(
                    "OTP_SECRET must be set in production".to_string(),
                )
                .into());
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> &Path {
        self.database_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_DATABASE))
    }

    pub fn dev_routes_enabled(&self) -> bool {
        self.enable_dev_routes
            .unwrap_or(self.env == Environment::Dev)
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u32, ServerConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerConfigError::InvalidVar {
            key,
            value: value.to_string(),
        })
}
