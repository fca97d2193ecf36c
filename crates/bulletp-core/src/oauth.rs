//! Single-use OAuth login states and the provider code-exchange seam

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::clock::to_millis;
use crate::config::ConfigError;
use crate::error::{BulletpError, Result};
use crate::persistence::Repository;

const WECHAT_QR_ENDPOINT: &str = "https://open.weixin.qq.com/connect/qrconnect";

/// A freshly created login state
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthState {
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

pub(crate) fn start(conn: &Connection, repo: &Repository) -> Result<OAuthState> {
    let now = repo.now();
    let expires_at = now + Duration::seconds(i64::from(repo.config().oauth.state_ttl_seconds));
    let state = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO oauth_login_states (id, state, expires_at, consumed_at, created_at)
         VALUES (?1, ?2, ?3, NULL, ?4)",
        params![
            Uuid::new_v4().to_string(),
            state,
            to_millis(expires_at),
            to_millis(now)
        ],
    )?;
    Ok(OAuthState { state, expires_at })
}

/// Redeem `state`. The unconsumed/unexpired check and the consume are one
/// statement, so two callbacks can never both succeed.
pub(crate) fn consume(conn: &Connection, repo: &Repository, state: &str) -> Result<()> {
    let now = to_millis(repo.now());
    let changed = conn.execute(
        "UPDATE oauth_login_states SET consumed_at = ?1
         WHERE state = ?2 AND consumed_at IS NULL AND expires_at > ?1",
        params![now, state.trim()],
    )?;
    if changed != 1 {
        return Err(BulletpError::invalid("invalid or expired state"));
    }
    Ok(())
}

/// Read-only check used to reject stale callbacks before talking to the
/// provider
pub(crate) fn is_live(conn: &Connection, repo: &Repository, state: &str) -> Result<bool> {
    let live = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM oauth_login_states
                       WHERE state = ?1 AND consumed_at IS NULL AND expires_at > ?2)",
        params![state.trim(), to_millis(repo.now())],
        |row| row.get(0),
    )?;
    Ok(live)
}

/// QR-connect URL the client renders as a QR code
pub fn wechat_qr_url(appid: &str, redirect_uri: &str, state: &str) -> std::result::Result<String, ConfigError> {
    let mut url = Url::parse_with_params(
        WECHAT_QR_ENDPOINT,
        &[
            ("appid", appid),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", "snsapi_login"),
            ("state", state),
        ],
    )
    .map_err(|e| ConfigError::Invalid(format!("wechat qr url: {e}")))?;
    url.set_fragment(Some("wechat_redirect"));
    Ok(url.into())
}

/// Failure of the provider code exchange
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The provider refused the authorization code
    #[error("authorization code rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached or answered garbage
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ExchangeError> for BulletpError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Rejected(_) => BulletpError::invalid("invalid authorization code"),
            ExchangeError::Unavailable(msg) => BulletpError::Upstream(msg),
        }
    }
}

/// Turns a provider authorization code into the provider's stable subject id
pub trait SubjectExchanger: Send + Sync {
    fn exchange(&self, code: &str) -> std::result::Result<String, ExchangeError>;
}

/// Development exchanger: the subject is derived from the code itself.
/// Never use in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevSubjectExchanger;

impl SubjectExchanger for DevSubjectExchanger {
    fn exchange(&self, code: &str) -> std::result::Result<String, ExchangeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ExchangeError::Rejected("empty code".to_string()));
        }
        Ok(format!("dev_openid_{code}"))
    }
}

impl Repository {
    pub fn start_oauth_state(&self) -> Result<OAuthState> {
        self.write(|tx| start(tx, self))
    }

    /// Consume a state exactly once. Fails with "invalid or expired state"
    /// for unknown, consumed or expired tokens.
    pub fn consume_oauth_state(&self, state: &str) -> Result<()> {
        self.write(|tx| consume(tx, self, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BulletpConfig;
    use std::sync::Arc;

    fn setup() -> (Repository, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let repo = Repository::in_memory_with(BulletpConfig::default(), clock.clone()).unwrap();
        (repo, clock)
    }

    #[test]
    fn test_state_is_single_use() {
        let (repo, _) = setup();
        let started = repo.start_oauth_state().unwrap();
        repo.consume_oauth_state(&started.state).unwrap();
        let err = repo.consume_oauth_state(&started.state).unwrap_err();
        assert!(matches!(err, BulletpError::InvalidArgument(ref m) if m == "invalid or expired state"));
    }

    #[test]
    fn test_state_expires() {
        let (repo, clock) = setup();
        let started = repo.start_oauth_state().unwrap();
        clock.advance(Duration::seconds(300));
        assert!(repo.consume_oauth_state(&started.state).is_err());
    }

    #[test]
    fn test_unknown_state() {
        let (repo, _) = setup();
        assert!(repo.consume_oauth_state("nope").is_err());
        assert!(repo.consume_oauth_state("").is_err());
    }

    #[test]
    fn test_is_live() {
        let (repo, clock) = setup();
        let started = repo.start_oauth_state().unwrap();
        assert!(repo.read(|tx| is_live(tx, &repo, &started.state)).unwrap());
        clock.advance(Duration::minutes(6));
        assert!(!repo.read(|tx| is_live(tx, &repo, &started.state)).unwrap());
    }

    #[test]
    fn test_qr_url() {
        let url = wechat_qr_url("wx123", "https://app.example/cb?x=1", "s-1").unwrap();
        assert!(url.starts_with("https://open.weixin.qq.com/connect/qrconnect?appid=wx123&"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example%2Fcb%3Fx%3D1"));
        assert!(url.contains("response_type=code&scope=snsapi_login&state=s-1"));
        assert!(url.ends_with("#wechat_redirect"));
    }

    #[test]
    fn test_dev_exchanger() {
        assert_eq!(DevSubjectExchanger.exchange("abc").unwrap(), "dev_openid_abc");
        assert!(DevSubjectExchanger.exchange(" ").is_err());
    }
}
