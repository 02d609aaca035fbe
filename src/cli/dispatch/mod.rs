//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{console::Args, Action};
use crate::cli::commands::gate;
use anyhow::Result;

/// Map validated CLI matches to the console action.
///
/// # Errors
/// Returns an error if required arguments are missing or out of range.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let options = gate::Options::parse(matches)?;

    Ok(Action::Console(Args {
        state_file: options.state_file,
        issuer: options.issuer,
        otp_ttl_seconds: options.otp_ttl_seconds,
        max_failures: options.max_failures,
        backlog_max: options.backlog_max,
        backlog_ttl_seconds: options.backlog_ttl_seconds,
        admins: options.admins,
        identity: options.identity,
        qr_mode: options.qr_mode,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_console_action() {
        temp_env::with_vars(
            [
                ("OTPGATE_ADMINS", None::<&str>),
                ("OTPGATE_IDENTITY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "otpgate",
                    "--admin",
                    "root",
                    "--identity",
                    "alice",
                    "--otp-ttl",
                    "60",
                ]);
                let Ok(Action::Console(args)) = handler(&matches) else {
                    panic!("expected console action");
                };
                assert_eq!(args.admins, vec!["root"]);
                assert_eq!(args.identity, "alice");
                assert_eq!(args.otp_ttl_seconds, 60);
            },
        );
    }

    #[test]
    fn rejects_zero_ttl() {
        temp_env::with_vars([("OTPGATE_OTP_TTL", Some("0"))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["otpgate"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--otp-ttl must be greater than zero"));
            }
        });
    }

    #[test]
    fn rejects_ttl_beyond_range() {
        temp_env::with_vars(
            [
                ("OTPGATE_OTP_TTL", None::<&str>),
                ("OTPGATE_BACKLOG_TTL", Some("9223372036854775807")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "otpgate",
                    "--otp-ttl",
                    "9223372036854775807",
                ]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("--otp-ttl is too large"));
                }

                let matches = crate::cli::commands::new().get_matches_from(vec!["otpgate"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("--backlog-ttl is too large"));
                }
            },
        );
    }
}
