//! Invocations parked until their caller proves a fresh OTP.

use crate::gate::identity::Identity;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Everything needed to re-run a command exactly as it was first issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub identity: Identity,
    /// Transport address replies go to.
    pub reply_to: String,
    pub command: String,
    pub args: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogEntry {
    pub invocation: Invocation,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Backlog {
    entries: VecDeque<BacklogEntry>,
    max_per_identity: usize,
    ttl: TimeDelta,
}

impl Backlog {
    #[must_use]
    pub fn new(max_per_identity: usize, ttl: TimeDelta) -> Self {
        Self {
            entries: VecDeque::new(),
            max_per_identity: max_per_identity.max(1),
            ttl,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn pending_for(&self, identity: &Identity) -> usize {
        self.entries
            .iter()
            .filter(|entry| &entry.invocation.identity == identity)
            .count()
    }

    /// Append an invocation. Expired entries are pruned first; if the
    /// identity is still at its cap, its oldest entry is evicted and returned.
    pub fn enqueue(&mut self, invocation: Invocation, now: DateTime<Utc>) -> Option<BacklogEntry> {
        self.prune(now);

        let evicted = if self.pending_for(&invocation.identity) >= self.max_per_identity {
            self.entries
                .iter()
                .position(|entry| entry.invocation.identity == invocation.identity)
                .and_then(|index| self.entries.remove(index))
        } else {
            None
        };

        if let Some(entry) = &evicted {
            warn!(
                identity = %entry.invocation.identity,
                command = %entry.invocation.command,
                "backlog full, dropping oldest pending command"
            );
        }

        self.entries.push_back(BacklogEntry {
            invocation,
            enqueued_at: now,
        });

        evicted
    }

    /// Remove and return every entry for `identity`, oldest first.
    /// Expired entries are removed too but not returned.
    pub fn drain_for(&mut self, identity: &Identity, now: DateTime<Utc>) -> Vec<BacklogEntry> {
        let (matching, rest): (VecDeque<_>, VecDeque<_>) = self
            .entries
            .drain(..)
            .partition(|entry| &entry.invocation.identity == identity);
        self.entries = rest;

        let (live, expired): (Vec<_>, Vec<_>) = matching
            .into_iter()
            .partition(|entry| now - entry.enqueued_at <= self.ttl);

        if !expired.is_empty() {
            debug!(%identity, expired = expired.len(), "discarding expired backlog entries");
        }

        live
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|entry| now - entry.enqueued_at <= ttl);
    }
}
