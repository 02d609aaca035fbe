//! Durable snapshots of the protected-command set and secret records.

use crate::gate::{error::GateError, identity::Identity, registry::CommandRegistry, secrets::SecretRecord};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub commands: CommandRegistry,
    #[serde(default)]
    pub secrets: HashMap<Identity, SecretRecord>,
}

pub trait StateStore: Send + Sync {
    /// Load the last snapshot, or an empty one if nothing was saved yet.
    ///
    /// # Errors
    /// Returns an error if stored data exists but cannot be read or decoded.
    fn load(&self) -> Result<Snapshot, GateError>;

    /// # Errors
    /// Returns an error if the snapshot cannot be written.
    fn save(&self, snapshot: &Snapshot) -> Result<(), GateError>;
}

/// JSON file written atomically through a sibling temp file.
///
/// The file holds plaintext TOTP secrets; on unix it is only readable by
/// its owner.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, GateError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file yet, starting empty");
                Ok(Snapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), GateError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        // A stale temp file keeps its old mode, so set it explicitly too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store, handy for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    #[must_use]
    pub fn current(&self) -> Snapshot {
        self.snapshot
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, GateError> {
        Ok(self.current())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), GateError> {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = snapshot.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gate::{secrets::SecretStore, totp::TotpConfig};
    use ulid::Ulid;

    fn scratch_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("otpgate-test-{label}-{}.json", Ulid::new()))
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = JsonFileStore::new(scratch_path("missing"));
        assert_eq!(store.load().unwrap(), Snapshot::default());
    }

    #[test]
    fn save_then_load() {
        let path = scratch_path("roundtrip");
        let store = JsonFileStore::new(&path);

        let mut secrets = SecretStore::new(TotpConfig::default(), 10);
        secrets.grant(&Identity::from("alice")).unwrap();
        let mut commands = CommandRegistry::new();
        commands.add("deploy");

        let snapshot = Snapshot {
            commands,
            secrets: secrets.records().clone(),
        };
        store.save(&snapshot).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(store.load().unwrap(), snapshot);

        let _ = fs::remove_file(path);
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = scratch_path("mode");
        // A world-readable leftover must not leak into the saved file.
        fs::write(path.with_extension("tmp"), b"").unwrap();
        fs::set_permissions(path.with_extension("tmp"), fs::Permissions::from_mode(0o644)).unwrap();

        let store = JsonFileStore::new(&path);
        let mut secrets = SecretStore::new(TotpConfig::default(), 10);
        secrets.grant(&Identity::from("alice")).unwrap();
        store
            .save(&Snapshot {
                commands: CommandRegistry::new(),
                secrets: secrets.records().clone(),
            })
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = scratch_path("corrupt");
        fs::write(&path, b"{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(GateError::Serde(_))));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn memory_store_keeps_last_snapshot() {
        let store = MemoryStore::default();
        let mut snapshot = Snapshot::default();
        snapshot.commands.add("deploy");
        store.save(&snapshot).unwrap();
        assert!(store.load().unwrap().commands.contains("deploy"));
    }
}
