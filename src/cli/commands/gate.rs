use crate::gate::{
    provisioning::QrMode, BACKLOG_MAX_PER_IDENTITY, BACKLOG_TTL_SECONDS, OTP_EXPIRATION_SECONDS,
    OTP_MAX_FAILURES,
};
use anyhow::{anyhow, Result};
use chrono::TimeDelta;
use clap::{Arg, ArgAction, Command};

pub const ARG_STATE_FILE: &str = "state-file";
pub const ARG_ISSUER: &str = "issuer";
pub const ARG_OTP_TTL: &str = "otp-ttl";
pub const ARG_MAX_FAILURES: &str = "max-failures";
pub const ARG_BACKLOG_MAX: &str = "backlog-max";
pub const ARG_BACKLOG_TTL: &str = "backlog-ttl";
pub const ARG_ADMIN: &str = "admin";
pub const ARG_IDENTITY: &str = "identity";
pub const ARG_QR_MODE: &str = "qr-mode";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STATE_FILE)
                .long(ARG_STATE_FILE)
                .help("JSON file holding protected commands and OTP secrets")
                .default_value("otpgate.json")
                .env("OTPGATE_STATE_FILE"),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Issuer shown in authenticator apps")
                .default_value("otpgate")
                .env("OTPGATE_ISSUER"),
        )
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("Seconds a verified OTP keeps protected commands unlocked")
                .default_value("86400")
                .env("OTPGATE_OTP_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_MAX_FAILURES)
                .long(ARG_MAX_FAILURES)
                .help("Consecutive failed codes before a secret is locked")
                .default_value("10")
                .env("OTPGATE_MAX_FAILURES")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_BACKLOG_MAX)
                .long(ARG_BACKLOG_MAX)
                .help("Maximum pending commands kept per identity")
                .default_value("16")
                .env("OTPGATE_BACKLOG_MAX")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_BACKLOG_TTL)
                .long(ARG_BACKLOG_TTL)
                .help("Seconds a pending command stays replayable")
                .default_value("3600")
                .env("OTPGATE_BACKLOG_TTL")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ADMIN)
                .long(ARG_ADMIN)
                .help("Identity allowed to run otp-* admin commands (repeatable)")
                .env("OTPGATE_ADMINS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_IDENTITY)
                .long(ARG_IDENTITY)
                .help("Identity of the local console user")
                .default_value("console")
                .env("OTPGATE_IDENTITY"),
        )
        .arg(
            Arg::new(ARG_QR_MODE)
                .long(ARG_QR_MODE)
                .help("How provisioning codes are rendered: text or graphic")
                .default_value("text")
                .env("OTPGATE_QR_MODE")
                .value_parser(|value: &str| value.parse::<QrMode>()),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub state_file: String,
    pub issuer: String,
    pub otp_ttl_seconds: i64,
    pub max_failures: u32,
    pub backlog_max: usize,
    pub backlog_ttl_seconds: i64,
    pub admins: Vec<String>,
    pub identity: String,
    pub qr_mode: QrMode,
}

impl Options {
    /// Parse gate options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if a value is missing or out of range.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let string = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let otp_ttl_seconds = ttl_seconds(matches, ARG_OTP_TTL, OTP_EXPIRATION_SECONDS)?;
        let backlog_ttl_seconds = ttl_seconds(matches, ARG_BACKLOG_TTL, BACKLOG_TTL_SECONDS)?;

        let max_failures = matches
            .get_one::<u32>(ARG_MAX_FAILURES)
            .copied()
            .unwrap_or(OTP_MAX_FAILURES);
        if max_failures == 0 {
            return Err(anyhow!("--{ARG_MAX_FAILURES} must be greater than zero"));
        }

        let admins = matches
            .get_many::<String>(ARG_ADMIN)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            state_file: string(ARG_STATE_FILE)?,
            issuer: string(ARG_ISSUER)?,
            otp_ttl_seconds,
            max_failures,
            backlog_max: matches
                .get_one::<usize>(ARG_BACKLOG_MAX)
                .copied()
                .unwrap_or(BACKLOG_MAX_PER_IDENTITY),
            backlog_ttl_seconds,
            admins,
            identity: string(ARG_IDENTITY)?,
            qr_mode: matches
                .get_one::<QrMode>(ARG_QR_MODE)
                .copied()
                .unwrap_or_default(),
        })
    }
}

/// Read a TTL in seconds; it must be positive and fit a [`TimeDelta`].
fn ttl_seconds(matches: &clap::ArgMatches, id: &str, default: i64) -> Result<i64> {
    let seconds = matches.get_one::<i64>(id).copied().unwrap_or(default);
    if seconds <= 0 {
        return Err(anyhow!("--{id} must be greater than zero"));
    }
    TimeDelta::try_seconds(seconds).ok_or_else(|| anyhow!("--{id} is too large: {seconds}"))?;
    Ok(seconds)
}
