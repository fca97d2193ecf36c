//! Code generation and keyed hashing

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Number of digits in an issued code
pub const CODE_DIGITS: usize = 6;

/// Uniformly random numeric code, zero-padded to [`CODE_DIGITS`]
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..10u32.pow(CODE_DIGITS as u32));
    format!("{n:0width$}", width = CODE_DIGITS)
}

/// HMAC-SHA256 keyed hash of one-time codes. Only the hex digest is ever
/// persisted.
#[derive(Clone)]
pub struct CodeHasher {
    mac: HmacSha256,
}

impl CodeHasher {
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingField("otp.secret".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ConfigError::Invalid(format!("otp.secret: {e}")))?;
        Ok(Self { mac })
    }

    /// Lowercase hex digest (64 chars)
    pub fn hash(&self, code: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(code.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison against a stored digest
    pub fn verify(&self, code: &str, stored: &str) -> bool {
        if stored.is_empty() {
            return false;
        }
        self.hash(code).as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

impl std::fmt::Debug for CodeHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeHasher").finish_non_exhaustive()
    }
}
