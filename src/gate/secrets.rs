use crate::gate::{identity::Identity, totp::TotpConfig};
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use tracing::{debug, warn};

/// Per-identity TOTP secret plus verification bookkeeping.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    secret: String,
    pub failures: u32,
    /// `None` until the first successful verification.
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked: bool,
}

impl SecretRecord {
    fn new(secret: String) -> Self {
        Self {
            secret,
            failures: 0,
            last_verified: None,
            locked: false,
        }
    }

    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("secret", &"[REDACTED]")
            .field("failures", &self.failures)
            .field("last_verified", &self.last_verified)
            .field("locked", &self.locked)
            .finish()
    }
}

/// Freshly issued secret, handed out once for enrollment.
#[derive(Debug)]
pub struct Grant {
    pub secret: SecretString,
    pub provisioning_uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected { failures: u32 },
    /// This attempt reached the failure limit.
    LockedOut,
    /// The record was already locked; nothing was checked.
    Locked,
    UnknownIdentity,
}

impl Verification {
    #[must_use]
    pub fn is_verified(self) -> bool {
        self == Self::Verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Unknown,
    Locked,
    Stale,
    Fresh,
}

#[derive(Debug, Clone)]
pub struct SecretStore {
    records: HashMap<Identity, SecretRecord>,
    totp: TotpConfig,
    max_failures: u32,
}

impl SecretStore {
    #[must_use]
    pub fn new(totp: TotpConfig, max_failures: u32) -> Self {
        Self {
            records: HashMap::new(),
            totp,
            max_failures,
        }
    }

    #[must_use]
    pub fn with_records(mut self, records: HashMap<Identity, SecretRecord>) -> Self {
        self.records = records;
        self
    }

    /// Replace every record, e.g. to roll back to an earlier snapshot.
    pub fn replace_records(&mut self, records: HashMap<Identity, SecretRecord>) {
        self.records = records;
    }

    #[must_use]
    pub fn records(&self) -> &HashMap<Identity, SecretRecord> {
        &self.records
    }

    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<&SecretRecord> {
        self.records.get(identity)
    }

    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity)
    }

    /// Issue (or re-issue) a secret, replacing any previous record.
    ///
    /// # Errors
    /// Returns an error if the provisioning URI cannot be built.
    pub fn grant(&mut self, identity: &Identity) -> Result<Grant> {
        let secret = self.totp.generate_secret();
        let provisioning_uri = self.totp.provisioning_uri(&secret, identity.as_str())?;

        self.records
            .insert(identity.clone(), SecretRecord::new(secret.clone()));

        Ok(Grant {
            secret: SecretString::from(secret),
            provisioning_uri,
        })
    }

    /// Check `code` for `identity` at `now`.
    ///
    /// A record that reaches `max_failures` consecutive failures is locked and
    /// stays locked until it is granted again.
    pub fn verify(&mut self, identity: &Identity, code: u32, now: DateTime<Utc>) -> Verification {
        let Some(record) = self.records.get_mut(identity) else {
            return Verification::UnknownIdentity;
        };

        if record.locked {
            return Verification::Locked;
        }

        let unix_time = u64::try_from(now.timestamp()).unwrap_or_default();
        let valid = match self.totp.check(record.secret(), code, unix_time) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(%identity, "TOTP check failed: {e}");
                false
            }
        };

        if valid {
            record.failures = 0;
            record.last_verified = Some(record.last_verified.map_or(now, |last| last.max(now)));
            debug!(%identity, "OTP verified");
            return Verification::Verified;
        }

        record.failures = record.failures.saturating_add(1);
        if record.failures >= self.max_failures {
            record.locked = true;
            warn!(%identity, failures = record.failures, "OTP secret locked");
            return Verification::LockedOut;
        }

        Verification::Rejected {
            failures: record.failures,
        }
    }

    /// True iff a usable record exists and it was verified within `ttl` of `now`.
    #[must_use]
    pub fn is_fresh(&self, identity: &Identity, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.standing(identity, now, ttl) == Standing::Fresh
    }

    #[must_use]
    pub fn standing(&self, identity: &Identity, now: DateTime<Utc>, ttl: TimeDelta) -> Standing {
        match self.records.get(identity) {
            None => Standing::Unknown,
            Some(record) if record.locked => Standing::Locked,
            Some(record) => match record.last_verified {
                Some(last) if now - last <= ttl => Standing::Fresh,
                _ => Standing::Stale,
            },
        }
    }

    pub fn remove(&mut self, identity: &Identity) -> Option<SecretRecord> {
        self.records.remove(identity)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
