//! Identity resolution for chat senders.
//!
//! Every piece of gate state is keyed by [`Identity`]. How an identity is
//! derived depends on where the message came from, so each sender variant
//! implements [`Sender`] itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable correlation key for a principal, independent of transport addressing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Whether an inbound chat message was addressed to the bot or to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Direct,
    Group,
}

pub trait Sender: Send + Sync {
    /// Identity used for secrets, freshness and the backlog.
    fn identity(&self) -> Identity;

    /// Where replies to this sender should be delivered.
    fn address(&self) -> String;
}

/// A person talking to the bot one-to-one.
#[derive(Debug, Clone)]
pub struct DirectUser {
    pub person: String,
}

impl Sender for DirectUser {
    fn identity(&self) -> Identity {
        Identity::new(self.person.as_str())
    }

    fn address(&self) -> String {
        self.person.clone()
    }
}

/// A member of a multi-user room, addressed through the room.
#[derive(Debug, Clone)]
pub struct RoomOccupant {
    pub room: String,
    pub nick: String,
    pub person: String,
}

impl Sender for RoomOccupant {
    fn identity(&self) -> Identity {
        Identity::new(self.person.as_str())
    }

    fn address(&self) -> String {
        format!("{}/{}", self.room, self.nick)
    }
}

/// A user from a federated backend whose ACL attribute differs from the
/// transport-level person identifier.
#[derive(Debug, Clone)]
pub struct FederatedUser {
    pub person: String,
    pub acl_attr: String,
}

impl Sender for FederatedUser {
    fn identity(&self) -> Identity {
        Identity::new(self.acl_attr.as_str())
    }

    fn address(&self) -> String {
        self.person.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_occupant_resolves_to_person() {
        let sender = RoomOccupant {
            room: "#ops".to_string(),
            nick: "al".to_string(),
            person: "alice".to_string(),
        };
        assert_eq!(sender.identity(), Identity::from("alice"));
        assert_eq!(sender.address(), "#ops/al");
    }

    #[test]
    fn federated_user_prefers_acl_attribute() {
        let sender = FederatedUser {
            person: "@alice:example.org".to_string(),
            acl_attr: "alice@corp".to_string(),
        };
        assert_eq!(sender.identity().as_str(), "alice@corp");
        assert_eq!(sender.address(), "@alice:example.org");
    }

    #[test]
    fn identity_serializes_as_plain_string() -> serde_json::Result<()> {
        let json = serde_json::to_string(&Identity::from("bob"))?;
        assert_eq!(json, "\"bob\"");
        Ok(())
    }
}
