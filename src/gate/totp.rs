//! Thin wrapper over `totp-rs` (RFC 6238).

use anyhow::{anyhow, Result};
use rand::{rngs::OsRng, RngCore};
use totp_rs::{Algorithm, Secret, TOTP};

/// 160-bit secrets, the size RFC 4226 recommends.
const SECRET_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer name shown in authenticator apps.
    pub issuer: String,
    pub digits: usize,
    /// Time step in seconds.
    pub step: u64,
    /// Accepted windows before/after the current one.
    pub skew: u8,
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "otpgate".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
            algorithm: Algorithm::SHA1,
        }
    }
}

impl TotpConfig {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Default::default()
        }
    }

    /// Generate a fresh base32-encoded secret from the OS RNG.
    #[must_use]
    pub fn generate_secret(&self) -> String {
        let mut bytes = vec![0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Secret::Raw(bytes).to_encoded().to_string()
    }

    /// Build a `TOTP` for `secret` with `account` as its label.
    ///
    /// # Errors
    /// Returns an error if the secret is not valid base32 or is too short.
    pub fn build(&self, secret: &str, account: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| anyhow!("Invalid TOTP secret: {e:?}"))?;

        TOTP::new(
            self.algorithm,
            self.digits,
            self.skew,
            self.step,
            bytes,
            Some(self.issuer.clone()),
            account_label(account),
        )
        .map_err(|e| anyhow!("TOTP init error: {e}"))
    }

    /// `otpauth://` URI for enrolling `secret` in an authenticator app.
    ///
    /// # Errors
    /// Returns an error if the TOTP cannot be built.
    pub fn provisioning_uri(&self, secret: &str, account: &str) -> Result<String> {
        Ok(self.build(secret, account)?.get_url())
    }

    /// Check a numeric code at `unix_time`, honoring the configured skew.
    ///
    /// Codes are zero-padded to the configured width, so `12345` matches `"012345"`.
    ///
    /// # Errors
    /// Returns an error if the TOTP cannot be built.
    pub fn check(&self, secret: &str, code: u32, unix_time: u64) -> Result<bool> {
        let totp = self.build(secret, "check")?;
        let token = format!("{code:0width$}", width = self.digits);
        Ok(totp.check(&token, unix_time))
    }

    /// Code valid at `unix_time`.
    ///
    /// # Errors
    /// Returns an error if the TOTP cannot be built.
    pub fn generate(&self, secret: &str, unix_time: u64) -> Result<String> {
        Ok(self.build(secret, "generate")?.generate(unix_time))
    }
}

/// `totp-rs` rejects `:` in labels since it separates issuer and account.
fn account_label(account: &str) -> String {
    account.replace(':', "_")
}
