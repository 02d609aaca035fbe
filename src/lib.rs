//! # otpgate
//!
//! Step-up (second-factor) authentication for chat command dispatchers.
//!
//! Commands flagged as sensitive only run when their caller proved a fresh
//! TOTP code. A challenged command is parked, the caller is asked for a code
//! out of band, and once a valid code arrives as a direct message the parked
//! command runs with its original arguments.
//!
//! - [`gate`] holds the state machine: secrets, protected commands, the
//!   backlog, the command filter and the verifier.
//! - [`cli`] hosts the gate behind a console transport.

pub mod cli;
pub mod gate;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
