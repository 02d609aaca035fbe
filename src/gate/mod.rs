//! Step-up OTP gate.
//!
//! Commands listed in the [`registry::CommandRegistry`] only run if their
//! caller verified a TOTP code within the freshness window. Otherwise the
//! [`filter::AuthGate`] challenges the call and parks it in the
//! [`backlog::Backlog`]; when the [`verifier::Verifier`] accepts a code sent
//! as a direct message, the parked calls are handed back for replay in their
//! original order.

pub mod admin;
pub mod backlog;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod identity;
pub mod provisioning;
pub mod registry;
pub mod secrets;
pub mod state;
pub mod storage;
pub mod totp;
pub mod verifier;

pub use dispatcher::{CommandExecutor, Dispatcher, Notifier};
pub use error::GateError;
pub use filter::{AuthGate, Decision};
pub use identity::{Identity, MessageKind, Sender};
pub use state::GateState;
pub use verifier::{MessageOutcome, Verifier};

use chrono::TimeDelta;
use provisioning::QrMode;
use totp::TotpConfig;

/// People have to enter an OTP once a day.
pub const OTP_EXPIRATION_SECONDS: i64 = 86_400;

/// Consecutive failed codes before a secret is locked.
pub const OTP_MAX_FAILURES: u32 = 10;

pub const BACKLOG_MAX_PER_IDENTITY: usize = 16;

pub const BACKLOG_TTL_SECONDS: i64 = 3_600;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub totp: TotpConfig,
    /// Freshness window after a successful verification.
    pub otp_ttl: TimeDelta,
    pub max_failures: u32,
    pub backlog_max: usize,
    pub backlog_ttl: TimeDelta,
    pub qr_mode: QrMode,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            totp: TotpConfig::default(),
            otp_ttl: TimeDelta::seconds(OTP_EXPIRATION_SECONDS),
            max_failures: OTP_MAX_FAILURES,
            backlog_max: BACKLOG_MAX_PER_IDENTITY,
            backlog_ttl: TimeDelta::seconds(BACKLOG_TTL_SECONDS),
            qr_mode: QrMode::Text,
        }
    }
}
