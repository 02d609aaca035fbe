use crate::gate::{
    backlog::Invocation, error::GateError, secrets::Standing, state::GateState,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub enum Decision {
    /// Let the normal dispatch path run the command.
    Allow,
    /// Suppressed; the error carries the message for the caller.
    Challenge(GateError),
}

impl Decision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Command filter run before every invocation.
#[derive(Clone)]
pub struct AuthGate {
    state: Arc<GateState>,
}

impl AuthGate {
    #[must_use]
    pub fn new(state: Arc<GateState>) -> Self {
        Self { state }
    }

    pub async fn filter(&self, invocation: Invocation) -> Decision {
        self.filter_at(invocation, Utc::now()).await
    }

    /// Decide whether `invocation` may run at `now`.
    ///
    /// Stale callers get their invocation parked in the backlog. The
    /// freshness check and the enqueue happen under the same `auth` lock a
    /// verification holds while draining, so nothing is parked after the
    /// drain that should have released it.
    pub async fn filter_at(&self, invocation: Invocation, now: DateTime<Utc>) -> Decision {
        let auth = self.state.auth().await;

        if !auth.commands.contains(&invocation.command) {
            return Decision::Allow;
        }

        let identity = invocation.identity.clone();
        debug!(%identity, command = %invocation.command, "command is protected by OTP");

        match auth
            .secrets
            .standing(&identity, now, self.state.config().otp_ttl)
        {
            Standing::Fresh => {
                debug!(%identity, "OTP ok, allowing command");
                Decision::Allow
            }
            Standing::Unknown => {
                info!(%identity, "no OTP secret, command refused");
                Decision::Challenge(GateError::UnknownIdentity(identity))
            }
            Standing::Locked => {
                info!(%identity, "OTP secret locked, command refused");
                Decision::Challenge(GateError::LockedOut(identity))
            }
            Standing::Stale => {
                info!(%identity, command = %invocation.command, "never OTP'ed or expired, parking command");
                let mut backlog = self.state.backlog_with(&auth).await;
                backlog.enqueue(invocation, now);
                Decision::Challenge(GateError::StaleAuthentication(identity))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gate::{identity::Identity, storage::MemoryStore, GateConfig};
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn gate() -> (Arc<GateState>, AuthGate) {
        let state = Arc::new(
            GateState::open(GateConfig::default(), Arc::new(MemoryStore::default())).unwrap(),
        );
        (state.clone(), AuthGate::new(state))
    }

    fn invocation(identity: &str, command: &str) -> Invocation {
        Invocation {
            identity: Identity::from(identity),
            reply_to: identity.to_string(),
            command: command.to_string(),
            args: "prod".to_string(),
        }
    }

    #[tokio::test]
    async fn unprotected_commands_pass() {
        let (state, gate) = gate();
        assert!(gate.filter_at(invocation("alice", "status"), t0()).await.is_allowed());
        assert!(state.backlog().await.is_empty());
    }

    #[tokio::test]
    async fn protected_without_secret_fails_closed() {
        let (state, gate) = gate();
        state.auth().await.commands.add("deploy");

        let decision = gate.filter_at(invocation("alice", "deploy"), t0()).await;
        assert!(matches!(decision, Decision::Challenge(GateError::UnknownIdentity(_))));
        assert!(state.backlog().await.is_empty());
    }

    #[tokio::test]
    async fn stale_secret_parks_invocation() {
        let (state, gate) = gate();
        {
            let mut auth = state.auth().await;
            auth.commands.add("deploy");
            auth.secrets.grant(&Identity::from("alice")).unwrap();
        }

        let decision = gate.filter_at(invocation("alice", "deploy"), t0()).await;
        assert!(matches!(
            decision,
            Decision::Challenge(GateError::StaleAuthentication(_))
        ));
        assert_eq!(state.backlog().await.pending_for(&Identity::from("alice")), 1);
    }

    #[tokio::test]
    async fn fresh_secret_allows_until_expiry() {
        let (state, gate) = gate();
        let alice = Identity::from("alice");
        {
            let mut auth = state.auth().await;
            auth.commands.add("deploy");
            auth.secrets.grant(&alice).unwrap();
            let secret = auth.secrets.get(&alice).unwrap().secret().to_string();
            let code = state
                .config()
                .totp
                .generate(&secret, 1_700_000_000)
                .unwrap()
                .parse()
                .unwrap();
            assert!(auth.secrets.verify(&alice, code, t0()).is_verified());
        }

        let later = t0() + TimeDelta::hours(23);
        assert!(gate.filter_at(invocation("alice", "deploy"), later).await.is_allowed());

        let expired = t0() + TimeDelta::hours(25);
        assert!(!gate.filter_at(invocation("alice", "deploy"), expired).await.is_allowed());
    }

    #[tokio::test]
    async fn locked_secret_is_not_parked() {
        let mut config = GateConfig::default();
        config.max_failures = 1;
        let state = Arc::new(GateState::open(config, Arc::new(MemoryStore::default())).unwrap());
        let gate = AuthGate::new(state.clone());
        let alice = Identity::from("alice");
        {
            let mut auth = state.auth().await;
            auth.commands.add("deploy");
            auth.secrets.grant(&alice).unwrap();
            let secret = auth.secrets.get(&alice).unwrap().secret().to_string();
            let good: u32 = state
                .config()
                .totp
                .generate(&secret, 1_700_000_000)
                .unwrap()
                .parse()
                .unwrap();
            auth.secrets.verify(&alice, (good + 1) % 1_000_000, t0());
        }

        let decision = gate.filter_at(invocation("alice", "deploy"), t0()).await;
        assert!(matches!(decision, Decision::Challenge(GateError::LockedOut(_))));
        assert!(state.backlog().await.is_empty());
    }
}
