//! Configuration for bulletp-core
//!
//! Tunables for the one-time-code gate, the OAuth state gate and the
//! tree engine. Everything has a development-friendly default.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Secret used when none is configured. Rejected in production.
pub const DEV_OTP_SECRET: &str = "dev_secret_change_me";

/// System-wide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletpConfig {
    /// Email one-time-code settings
    pub otp: OtpConfig,
    /// OAuth (WeChat) login settings
    pub oauth: OAuthConfig,
    /// Tree engine behavior
    pub tree: TreeConfig,
}

/// One-time-code gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// HMAC key used to hash stored codes
    pub secret: String,
    /// Lifetime of an issued code in seconds
    pub expire_seconds: u32,
    /// Minimum gap between two codes for the same email in seconds
    pub cooldown_seconds: u32,
    /// Maximum codes issued per originating IP in any one-hour window
    pub ip_limit_per_hour: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            secret: DEV_OTP_SECRET.to_string(),
            expire_seconds: 600,
            cooldown_seconds: 60,
            ip_limit_per_hour: 20,
        }
    }
}

/// OAuth login state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Lifetime of a login state token in seconds
    pub state_ttl_seconds: u32,
    pub wechat_appid: Option<String>,
    pub wechat_secret: Option<String>,
    /// Callback URL registered with WeChat
    pub wechat_redirect_uri: Option<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: 300,
            wechat_appid: None,
            wechat_secret: None,
            wechat_redirect_uri: None,
        }
    }
}

/// What deleting a bullet does to its siblings and descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Mark only the target; later siblings keep their indices
    LeaveGap,
    /// Mark the target and shift later siblings down by one
    #[default]
    CloseGap,
    /// Close the gap and mark the whole subtree deleted
    Cascade,
}

impl DeleteMode {
    pub fn name(&self) -> &'static str {
        match self {
            DeleteMode::LeaveGap => "leave_gap",
            DeleteMode::CloseGap => "close_gap",
            DeleteMode::Cascade => "cascade",
        }
    }
}

impl FromStr for DeleteMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "leave_gap" => Ok(DeleteMode::LeaveGap),
            "close_gap" => Ok(DeleteMode::CloseGap),
            "cascade" => Ok(DeleteMode::Cascade),
            other => Err(ConfigError::Invalid(format!("unknown delete mode: {other}"))),
        }
    }
}

/// Tree engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Label given to a freshly created root
    pub home_text: String,
    /// Upper bound applied to requested subtree depth
    pub max_subtree_depth: u32,
    /// Depth used when a caller does not ask for one
    pub default_subtree_depth: u32,
    pub delete_mode: DeleteMode,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            home_text: "Home".to_string(),
            max_subtree_depth: 5,
            default_subtree_depth: 5,
            delete_mode: DeleteMode::default(),
        }
    }
}

impl BulletpConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.otp.secret.is_empty() {
            return Err(ConfigError::MissingField("otp.secret".to_string()));
        }
        if self.otp.expire_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "otp.expire_seconds must be positive".to_string(),
            ));
        }
        if self.otp.ip_limit_per_hour == 0 {
            return Err(ConfigError::OutOfRange(
                "otp.ip_limit_per_hour must be positive".to_string(),
            ));
        }
        if self.oauth.state_ttl_seconds == 0 {
            return Err(ConfigError::OutOfRange(
                "oauth.state_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.tree.default_subtree_depth > self.tree.max_subtree_depth {
            return Err(ConfigError::OutOfRange(
                "tree.default_subtree_depth exceeds tree.max_subtree_depth".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    /// Required field is missing
    #[error("Missing field: {0}")]
    MissingField(String),
    /// Value could not be parsed or is not allowed here
    #[error("Invalid value: {0}")]
    Invalid(String),
}
