//! Pipeline wiring the gate to a chat transport.
//!
//! Commands go through [`AuthGate`] before they run; direct messages go
//! through [`Verifier`]. Notifications and command execution always happen
//! after the gate locks are released.

use crate::gate::{
    admin::{Admin, AdminCommand},
    backlog::Invocation,
    error::GateError,
    filter::{AuthGate, Decision},
    identity::{Identity, MessageKind, Sender},
    state::GateState,
    verifier::{MessageOutcome, Verifier},
};
use std::{collections::HashSet, sync::Arc};
use tracing::{error, info, warn};

/// Fire-and-forget message delivery.
pub trait Notifier: Send + Sync {
    fn send(&self, target: &str, text: &str);
}

/// Runs a command that passed the gate and returns its reply.
pub trait CommandExecutor: Send + Sync {
    /// # Errors
    /// Returns an error if the command fails; it is reported to the caller.
    fn execute(&self, invocation: &Invocation) -> anyhow::Result<String>;
}

/// What happened to an inbound chat event.
#[derive(Debug)]
pub enum Dispatch {
    Executed,
    Challenged(GateError),
    Verified { replayed: usize },
    Rejected(GateError),
    Ignored,
}

pub struct Dispatcher<E, N> {
    gate: AuthGate,
    verifier: Verifier,
    admin: Admin,
    admins: HashSet<Identity>,
    executor: E,
    notifier: N,
}

impl<E: CommandExecutor, N: Notifier> Dispatcher<E, N> {
    #[must_use]
    pub fn new(
        state: Arc<GateState>,
        admins: impl IntoIterator<Item = Identity>,
        executor: E,
        notifier: N,
    ) -> Self {
        Self {
            gate: AuthGate::new(state.clone()),
            verifier: Verifier::new(state.clone()),
            admin: Admin::new(state),
            admins: admins.into_iter().collect(),
            executor,
            notifier,
        }
    }

    #[must_use]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Filter a command invocation and run it if allowed.
    pub async fn on_command(&self, sender: &dyn Sender, command: &str, args: &str) -> Dispatch {
        let invocation = Invocation {
            identity: sender.identity(),
            reply_to: sender.address(),
            command: command.to_string(),
            args: args.to_string(),
        };

        match self.gate.filter(invocation.clone()).await {
            Decision::Allow => {
                self.run(&invocation).await;
                Dispatch::Executed
            }
            Decision::Challenge(reason) => {
                log_refusal(&invocation.command, &reason);
                self.notifier.send(&invocation.reply_to, &reason.to_string());
                Dispatch::Challenged(reason)
            }
        }
    }

    /// Handle a chat message that is not a command.
    pub async fn on_message(&self, sender: &dyn Sender, kind: MessageKind, body: &str) -> Dispatch {
        let reply_to = sender.address();

        match self.verifier.handle(&sender.identity(), kind, body).await {
            MessageOutcome::Ignored => Dispatch::Ignored,
            MessageOutcome::Failed(reason) => {
                log_refusal("otp", &reason);
                self.notifier.send(&reply_to, &reason.to_string());
                Dispatch::Rejected(reason)
            }
            MessageOutcome::Verified(entries) => {
                self.notifier.send(&reply_to, "OTP verified OK.");
                let replayed = entries.len();
                for entry in entries {
                    info!(
                        identity = %entry.invocation.identity,
                        command = %entry.invocation.command,
                        "processing command from the OTP backlog"
                    );
                    self.run(&entry.invocation).await;
                }
                Dispatch::Verified { replayed }
            }
        }
    }

    /// Execute an invocation that already passed the gate.
    async fn run(&self, invocation: &Invocation) {
        let reply = match AdminCommand::parse(&invocation.command, &invocation.args) {
            Some(_) if !self.admins.contains(&invocation.identity) => {
                let denied = GateError::PermissionDenied(invocation.identity.clone());
                log_refusal(&invocation.command, &denied);
                denied.to_string()
            }
            Some(Err(usage)) => usage,
            Some(Ok(command)) => match self.admin.execute(command).await {
                Ok(reply) => {
                    if let Some(outbound) = reply.outbound {
                        self.notifier.send(&outbound.target, &outbound.text);
                    }
                    reply.reply
                }
                Err(e) => {
                    error!(command = %invocation.command, "admin command failed: {e}");
                    e.to_string()
                }
            },
            None => match self.executor.execute(invocation) {
                Ok(reply) => reply,
                Err(e) => {
                    error!(command = %invocation.command, "command failed: {e:#}");
                    format!("Command {} failed: {e}", invocation.command)
                }
            },
        };

        if !reply.is_empty() {
            self.notifier.send(&invocation.reply_to, &reply);
        }
    }
}

fn log_refusal(command: &str, reason: &GateError) {
    match reason.identity() {
        Some(identity) => warn!(%identity, command, "refused: {reason}"),
        None => warn!(command, "refused: {reason}"),
    }
}
