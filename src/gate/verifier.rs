use crate::gate::{
    backlog::BacklogEntry,
    error::GateError,
    identity::{Identity, MessageKind},
    secrets::Verification,
    state::GateState,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum MessageOutcome {
    /// Not an OTP attempt (group message, not a number, or no secret).
    Ignored,
    /// Code accepted; these parked invocations must be replayed, in order.
    Verified(Vec<BacklogEntry>),
    Failed(GateError),
}

/// Parse a chat message body as an OTP code.
///
/// # Errors
/// Returns `GateError::MalformedOtpInput` if the body is not a non-negative integer.
pub fn parse_code(body: &str) -> Result<u32, GateError> {
    body.trim()
        .parse::<u32>()
        .map_err(|_| GateError::MalformedOtpInput)
}

/// Handles inbound direct messages that look like OTP codes.
#[derive(Clone)]
pub struct Verifier {
    state: Arc<GateState>,
}

impl Verifier {
    #[must_use]
    pub fn new(state: Arc<GateState>) -> Self {
        Self { state }
    }

    pub async fn handle(&self, identity: &Identity, kind: MessageKind, body: &str) -> MessageOutcome {
        self.handle_at(identity, kind, body, Utc::now()).await
    }

    /// Verify `body` as a code for `identity` at `now`.
    ///
    /// On success the identity's backlog is drained while the `auth` lock is
    /// still held, so concurrent verifications never replay an entry twice.
    pub async fn handle_at(
        &self,
        identity: &Identity,
        kind: MessageKind,
        body: &str,
        now: DateTime<Utc>,
    ) -> MessageOutcome {
        if kind == MessageKind::Group {
            return MessageOutcome::Ignored;
        }

        let code = match parse_code(body) {
            Ok(code) => code,
            Err(_) => return MessageOutcome::Ignored,
        };

        info!(%identity, "received what looks like an OTP");

        let mut auth = self.state.auth().await;
        if !auth.secrets.contains(identity) {
            info!(%identity, "no OTP secret, ignoring");
            return MessageOutcome::Ignored;
        }

        let verification = auth.secrets.verify(identity, code, now);
        match verification {
            Verification::Verified => {
                self.state.persist_or_log(&auth).await;
                let drained = self
                    .state
                    .backlog_with(&auth)
                    .await
                    .drain_for(identity, now);
                debug!(%identity, pending = drained.len(), "OTP verified, backlog drained");
                MessageOutcome::Verified(drained)
            }
            Verification::Rejected { failures } => {
                self.state.persist_or_log(&auth).await;
                warn!(%identity, failures, "OTP rejected");
                MessageOutcome::Failed(GateError::VerificationFailure(identity.clone()))
            }
            Verification::LockedOut => {
                self.state.persist_or_log(&auth).await;
                MessageOutcome::Failed(GateError::LockedOut(identity.clone()))
            }
            Verification::Locked => {
                debug!(%identity, "OTP secret is locked");
                MessageOutcome::Failed(GateError::LockedOut(identity.clone()))
            }
            Verification::UnknownIdentity => MessageOutcome::Ignored,
        }
    }
}
