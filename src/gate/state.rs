//! Authoritative in-process gate state.
//!
//! Two locks: `auth` guards secrets and protected commands, `backlog` guards
//! pending invocations. Whenever both are needed `auth` is taken first.

use crate::gate::{
    backlog::Backlog,
    error::GateError,
    registry::CommandRegistry,
    secrets::SecretStore,
    storage::{Snapshot, StateStore},
    GateConfig,
};
use std::{io, sync::Arc};
use tokio::{
    sync::{Mutex, MutexGuard},
    task,
};
use tracing::{debug, error};

#[derive(Debug)]
pub struct AuthState {
    pub secrets: SecretStore,
    pub commands: CommandRegistry,
}

impl AuthState {
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            commands: self.commands.clone(),
            secrets: self.secrets.records().clone(),
        }
    }

    /// Put back a snapshot taken with [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.commands = snapshot.commands;
        self.secrets.replace_records(snapshot.secrets);
    }
}

pub struct GateState {
    config: GateConfig,
    auth: Mutex<AuthState>,
    backlog: Mutex<Backlog>,
    store: Arc<dyn StateStore>,
}

impl GateState {
    /// Load persisted state from `store` and build the shared state.
    ///
    /// # Errors
    /// Returns an error if the store holds data that cannot be loaded.
    pub fn open(config: GateConfig, store: Arc<dyn StateStore>) -> Result<Self, GateError> {
        let snapshot = store.load()?;
        debug!(
            commands = snapshot.commands.list().len(),
            secrets = snapshot.secrets.len(),
            "gate state loaded"
        );

        let secrets = SecretStore::new(config.totp.clone(), config.max_failures)
            .with_records(snapshot.secrets);
        let backlog = Backlog::new(config.backlog_max, config.backlog_ttl);

        Ok(Self {
            auth: Mutex::new(AuthState {
                secrets,
                commands: snapshot.commands,
            }),
            backlog: Mutex::new(backlog),
            store,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub async fn auth(&self) -> MutexGuard<'_, AuthState> {
        self.auth.lock().await
    }

    /// Lock the backlog while already holding `auth`.
    pub async fn backlog_with<'a>(&'a self, _auth: &MutexGuard<'_, AuthState>) -> MutexGuard<'a, Backlog> {
        self.backlog.lock().await
    }

    /// Lock the backlog alone, for read-only inspection.
    pub async fn backlog(&self) -> MutexGuard<'_, Backlog> {
        self.backlog.lock().await
    }

    /// Write the current auth state through the store.
    ///
    /// The store runs on the blocking pool; callers keep holding `auth` until
    /// it returns, so snapshots land in mutation order.
    ///
    /// # Errors
    /// Returns an error if the store cannot persist the snapshot.
    pub async fn persist(&self, auth: &AuthState) -> Result<(), GateError> {
        let snapshot = auth.snapshot();
        let store = Arc::clone(&self.store);
        task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| GateError::Io(io::Error::other(e)))?
    }

    /// Like [`persist`](Self::persist) for paths where the in-memory state
    /// must win even if the write fails.
    pub async fn persist_or_log(&self, auth: &AuthState) {
        if let Err(e) = self.persist(auth).await {
            error!("failed to persist gate state: {e}");
        }
    }
}
