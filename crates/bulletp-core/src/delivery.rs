//! Code delivery seam
//!
//! Delivery always runs after the issuing transaction has committed. A
//! failure here is logged by the caller and never undoes the issued code.

use thiserror::Error;

/// Failure to hand a code to its recipient
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// Something that can get a one-time code to an email address
pub trait CodeSender: Send + Sync {
    fn send(&self, email: &str, code: &str) -> Result<(), DeliveryError>;
}

/// Development sender that writes the code to the log instead of mailing it
#[derive(Debug, Clone, Copy)]
pub struct LogCodeSender {
    /// Code lifetime quoted in the rendered message
    pub expire_seconds: u32,
}

impl LogCodeSender {
    pub fn new(expire_seconds: u32) -> Self {
        Self { expire_seconds }
    }
}

impl Default for LogCodeSender {
    fn default() -> Self {
        Self::new(600)
    }
}

impl CodeSender for LogCodeSender {
    fn send(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
        let mail = VerificationEmail::render(email, code, self.expire_seconds);
        tracing::info!(to = %mail.to, subject = %mail.subject, %code, "login code (log sender)");
        Ok(())
    }
}

/// Rendered verification message
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl VerificationEmail {
    pub const SUBJECT: &'static str = "Your BulletP verification code";

    pub fn render(to: &str, code: &str, expire_seconds: u32) -> Self {
        let minutes = expire_seconds.div_ceil(60);
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif;">
  <h2>BulletP Verification</h2>
  <p>Your verification code is:</p>
  <p style="font-size:24px;font-weight:bold;letter-spacing:2px;">{code}</p>
  <p>This code will expire in {minutes} minutes.</p>
  <p>If you did not request this, please ignore this email.</p>
</div>"#
        );
        Self {
            to: to.to_string(),
            subject: Self::SUBJECT.to_string(),
            html,
        }
    }
}
