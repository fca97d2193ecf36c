//! Login flows: each one ends with a resolved user and that user's root

use serde::Serialize;

use crate::config::ConfigError;
use crate::error::{BulletpError, Result};
use crate::identity::{self, Provider, UserId};
use crate::oauth::{self, SubjectExchanger};
use crate::otp;
use crate::persistence::Repository;
use crate::tree::BulletId;

/// Successful login
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginOutcome {
    pub user_id: UserId,
    pub home_id: BulletId,
}

/// Data the client needs to show a WeChat QR code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeChatStart {
    pub state: String,
    pub qr_url: String,
    pub expires_in: u32,
}

/// Successful WeChat login
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeChatLogin {
    pub user_id: UserId,
    pub home_id: BulletId,
    pub openid: String,
}

impl Repository {
    /// Verify an email code and log in, creating the account on first use.
    /// Consuming the code, creating the user and creating the root commit
    /// together or not at all.
    pub fn login_with_email_code(&self, email: &str, code: &str) -> Result<LoginOutcome> {
        let outcome = self.write(|tx| {
            let email = otp::verify(tx, self, email, code)?;
            let (user, root) = identity::resolve_or_create(tx, self, Provider::Email, &email)?;
            Ok(LoginOutcome {
                user_id: user.id,
                home_id: root.id,
            })
        })?;
        tracing::info!(user = %outcome.user_id, "email login");
        Ok(outcome)
    }

    /// Log in directly by provider and subject. Development only.
    pub fn bootstrap(&self, provider: &str, subject: &str) -> Result<LoginOutcome> {
        if provider.trim().is_empty() || subject.trim().is_empty() {
            return Err(BulletpError::invalid("provider/subject required"));
        }
        let provider: Provider = provider.parse()?;
        self.write(|tx| {
            let (user, root) = identity::resolve_or_create(tx, self, provider, subject)?;
            Ok(LoginOutcome {
                user_id: user.id,
                home_id: root.id,
            })
        })
    }

    /// Create a login state and the QR-connect URL that carries it
    pub fn begin_wechat_login(&self) -> Result<WeChatStart> {
        let settings = &self.config().oauth;
        let (Some(appid), Some(redirect_uri)) = (
            settings.wechat_appid.as_deref().filter(|s| !s.is_empty()),
            settings.wechat_redirect_uri.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(ConfigError::MissingField(
                "WECHAT_APPID/WECHAT_REDIRECT_URI not configured".to_string(),
            )
            .into());
        };

        let started = self.write(|tx| oauth::start(tx, self))?;
        let qr_url = oauth::wechat_qr_url(appid, redirect_uri, &started.state)?;
        Ok(WeChatStart {
            state: started.state,
            qr_url,
            expires_in: settings.state_ttl_seconds,
        })
    }

    /// Finish a WeChat login from the provider callback.
    ///
    /// Stale states are rejected before the provider is contacted. The code
    /// exchange runs outside any transaction; consuming the state and
    /// resolving the user then happen in one.
    pub fn complete_wechat_login(
        &self,
        exchanger: &dyn SubjectExchanger,
        code: &str,
        state: &str,
    ) -> Result<WeChatLogin> {
        if !self.read(|tx| oauth::is_live(tx, self, state))? {
            return Err(BulletpError::invalid("invalid or expired state"));
        }
        if code.trim().is_empty() {
            return Err(BulletpError::invalid("missing code"));
        }

        let openid = exchanger.exchange(code.trim()).map_err(|e| {
            tracing::warn!(error = %e, "wechat code exchange failed");
            BulletpError::from(e)
        })?;

        let login = self.write(|tx| {
            oauth::consume(tx, self, state)?;
            let (user, root) = identity::resolve_or_create(tx, self, Provider::WeChat, &openid)?;
            Ok(WeChatLogin {
                user_id: user.id,
                home_id: root.id,
                openid: openid.clone(),
            })
        })?;
        tracing::info!(user = %login.user_id, "wechat login");
        Ok(login)
    }
}
