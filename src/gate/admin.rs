//! Administrative command surface.

use crate::gate::{
    error::GateError, identity::Identity, provisioning, state::GateState,
};
use std::sync::Arc;
use tracing::{info, warn};

pub const CMD_ADD: &str = "otp-add-command";
pub const CMD_REMOVE: &str = "otp-remove-command";
pub const CMD_LIST: &str = "otp-list-commands";
pub const CMD_GRANT: &str = "otp-grant-secret";
pub const CMD_RESET: &str = "otp-reset-secret";
pub const CMD_ZAP_ALL: &str = "otp-zap-all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    AddCommand(String),
    RemoveCommand(String),
    ListCommands,
    GrantSecret(Identity),
    ResetSecret(Identity),
    ZapAll,
}

impl AdminCommand {
    /// Recognize an admin command.
    ///
    /// Returns `None` for non-admin commands and `Some(Err(usage))` when an
    /// admin command is missing its argument.
    #[must_use]
    pub fn parse(command: &str, args: &str) -> Option<Result<Self, String>> {
        let arg = args.trim();
        let required = |build: fn(&str) -> Self| {
            if arg.is_empty() {
                Err(format!("usage: {command} <argument>"))
            } else {
                Ok(build(arg))
            }
        };

        let parsed = match command {
            CMD_ADD => required(|a| Self::AddCommand(a.to_string())),
            CMD_REMOVE => required(|a| Self::RemoveCommand(a.to_string())),
            CMD_LIST => Ok(Self::ListCommands),
            CMD_GRANT => required(|a| Self::GrantSecret(Identity::from(a))),
            CMD_RESET => required(|a| Self::ResetSecret(Identity::from(a))),
            CMD_ZAP_ALL => Ok(Self::ZapAll),
            _ => return None,
        };

        Some(parsed)
    }
}

/// A notification to deliver once all locks are released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub target: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub reply: String,
    pub outbound: Option<Outbound>,
}

impl AdminReply {
    fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            outbound: None,
        }
    }
}

#[derive(Clone)]
pub struct Admin {
    state: Arc<GateState>,
}

impl Admin {
    #[must_use]
    pub fn new(state: Arc<GateState>) -> Self {
        Self { state }
    }

    /// Apply an admin command and persist the result.
    ///
    /// The change is rolled back in memory if it cannot be saved, so a failed
    /// reset leaves the previous secret in place.
    ///
    /// # Errors
    /// Returns `GateError::NotFound` when removing an unprotected command,
    /// or a persistence error if the new state cannot be saved.
    pub async fn execute(&self, command: AdminCommand) -> Result<AdminReply, GateError> {
        let mut auth = self.state.auth().await;
        let before = auth.snapshot();
        let zap = command == AdminCommand::ZapAll;

        let reply = match command {
            AdminCommand::AddCommand(name) => {
                auth.commands.add(name.as_str());
                info!(command = %name, "command flagged as OTP only");
                AdminReply::text(format!("Added '{name}' to OTP only commands."))
            }
            AdminCommand::RemoveCommand(name) => {
                auth.commands.remove(&name)?;
                info!(command = %name, "command no longer requires OTP");
                AdminReply::text(format!("Removed '{name}' from OTP only commands."))
            }
            AdminCommand::ListCommands => {
                return Ok(AdminReply::text(format!(
                    "Commands with mandatory OTP:\n{}",
                    auth.commands.list().join("\n")
                )));
            }
            AdminCommand::GrantSecret(identity) | AdminCommand::ResetSecret(identity) => {
                let grant = auth
                    .secrets
                    .grant(&identity)
                    .map_err(|e| GateError::Provisioning(e.to_string()))?;
                let text = provisioning::render(&grant.provisioning_uri, self.state.config().qr_mode)
                    .unwrap_or_else(|e| {
                        warn!(%identity, "falling back to plain provisioning message: {e}");
                        format!("content: {}", grant.provisioning_uri)
                    });
                info!(%identity, "new OTP secret issued");
                AdminReply {
                    reply: format!("New secret set for {identity} and message sent."),
                    outbound: Some(Outbound {
                        target: identity.to_string(),
                        text,
                    }),
                }
            }
            AdminCommand::ZapAll => {
                auth.commands.clear();
                auth.secrets.clear();
                AdminReply::text("All OTP commands, secrets and pending commands removed.")
            }
        };

        if let Err(e) = self.state.persist(&auth).await {
            auth.restore(before);
            warn!("admin change rolled back: {e}");
            return Err(e);
        }

        if zap {
            self.state.backlog_with(&auth).await.clear();
            warn!("all OTP state removed");
        }

        Ok(reply)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gate::{
        backlog::Invocation,
        storage::{MemoryStore, Snapshot, StateStore},
        GateConfig,
    };
    use chrono::Utc;
    use std::{
        io,
        sync::atomic::{AtomicBool, Ordering},
    };

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl StateStore for FlakyStore {
        fn load(&self) -> Result<Snapshot, GateError> {
            self.inner.load()
        }

        fn save(&self, snapshot: &Snapshot) -> Result<(), GateError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(io::Error::other("disk full").into());
            }
            self.inner.save(snapshot)
        }
    }

    fn flaky_admin() -> (Admin, Arc<GateState>, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::default());
        let state = Arc::new(GateState::open(GateConfig::default(), store.clone()).unwrap());
        (Admin::new(state.clone()), state, store)
    }

    fn admin() -> (Admin, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let state = Arc::new(GateState::open(GateConfig::default(), store.clone()).unwrap());
        (Admin::new(state), store)
    }

    #[test]
    fn parse_recognizes_admin_commands() {
        assert_eq!(
            AdminCommand::parse(CMD_ADD, " deploy "),
            Some(Ok(AdminCommand::AddCommand("deploy".to_string())))
        );
        assert_eq!(
            AdminCommand::parse(CMD_LIST, ""),
            Some(Ok(AdminCommand::ListCommands))
        );
        assert_eq!(
            AdminCommand::parse(CMD_RESET, "bob"),
            Some(Ok(AdminCommand::ResetSecret(Identity::from("bob"))))
        );
        assert!(matches!(AdminCommand::parse(CMD_GRANT, "  "), Some(Err(_))));
        assert_eq!(AdminCommand::parse("deploy", "prod"), None);
    }

    #[tokio::test]
    async fn add_list_remove() {
        let (admin, store) = admin();
        let reply = admin
            .execute(AdminCommand::AddCommand("deploy".to_string()))
            .await
            .unwrap();
        assert_eq!(reply.reply, "Added 'deploy' to OTP only commands.");
        admin
            .execute(AdminCommand::AddCommand("restart".to_string()))
            .await
            .unwrap();
        assert!(store.current().commands.contains("deploy"));

        let listed = admin.execute(AdminCommand::ListCommands).await.unwrap();
        assert_eq!(listed.reply, "Commands with mandatory OTP:\ndeploy\nrestart");

        let removed = admin
            .execute(AdminCommand::RemoveCommand("deploy".to_string()))
            .await
            .unwrap();
        assert_eq!(removed.reply, "Removed 'deploy' from OTP only commands.");

        let missing = admin
            .execute(AdminCommand::RemoveCommand("deploy".to_string()))
            .await;
        assert!(matches!(missing, Err(GateError::NotFound(_))));
        assert!(!store.current().commands.contains("deploy"));
    }

    #[tokio::test]
    async fn grant_sends_provisioning_to_identity() {
        let (admin, store) = admin();
        let reply = admin
            .execute(AdminCommand::GrantSecret(Identity::from("alice")))
            .await
            .unwrap();
        assert_eq!(reply.reply, "New secret set for alice and message sent.");
        let outbound = reply.outbound.unwrap();
        assert_eq!(outbound.target, "alice");
        assert!(outbound.text.contains("otpauth://totp/"));
        assert!(store.current().secrets.contains_key(&Identity::from("alice")));
    }

    #[tokio::test]
    async fn zap_all_clears_everything() {
        let (admin, store) = admin();
        admin
            .execute(AdminCommand::AddCommand("deploy".to_string()))
            .await
            .unwrap();
        admin
            .execute(AdminCommand::GrantSecret(Identity::from("alice")))
            .await
            .unwrap();

        admin.execute(AdminCommand::ZapAll).await.unwrap();
        let snapshot = store.current();
        assert!(snapshot.commands.list().is_empty());
        assert!(snapshot.secrets.is_empty());
    }

    #[tokio::test]
    async fn failed_reset_keeps_previous_secret() {
        let (admin, state, store) = flaky_admin();
        let alice = Identity::from("alice");
        admin
            .execute(AdminCommand::GrantSecret(alice.clone()))
            .await
            .unwrap();
        let original = state.auth().await.secrets.get(&alice).unwrap().secret().to_string();

        store.failing.store(true, Ordering::SeqCst);
        let result = admin.execute(AdminCommand::ResetSecret(alice.clone())).await;
        assert!(matches!(result, Err(GateError::Io(_))));

        let auth = state.auth().await;
        assert_eq!(auth.secrets.get(&alice).unwrap().secret(), original);
        assert_eq!(store.inner.current().secrets[&alice].secret(), original);
    }

    #[tokio::test]
    async fn failed_zap_all_changes_nothing() {
        let (admin, state, store) = flaky_admin();
        let alice = Identity::from("alice");
        admin
            .execute(AdminCommand::AddCommand("deploy".to_string()))
            .await
            .unwrap();
        admin
            .execute(AdminCommand::GrantSecret(alice.clone()))
            .await
            .unwrap();
        {
            let auth = state.auth().await;
            state.backlog_with(&auth).await.enqueue(
                Invocation {
                    identity: alice.clone(),
                    reply_to: "alice".to_string(),
                    command: "deploy".to_string(),
                    args: String::new(),
                },
                Utc::now(),
            );
        }

        store.failing.store(true, Ordering::SeqCst);
        assert!(admin.execute(AdminCommand::ZapAll).await.is_err());

        let auth = state.auth().await;
        assert!(auth.commands.contains("deploy"));
        assert!(auth.secrets.contains(&alice));
        drop(auth);
        assert_eq!(state.backlog().await.len(), 1);
    }
}
