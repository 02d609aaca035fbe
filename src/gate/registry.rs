use crate::gate::error::GateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Command names that require a fresh OTP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandRegistry {
    commands: BTreeSet<String>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the command was already protected.
    pub fn add(&mut self, name: impl Into<String>) -> bool {
        self.commands.insert(name.into())
    }

    /// # Errors
    /// Returns `GateError::NotFound` if `name` is not protected.
    pub fn remove(&mut self, name: &str) -> Result<(), GateError> {
        if self.commands.remove(name) {
            Ok(())
        } else {
            Err(GateError::NotFound(name.to_string()))
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    /// Sorted snapshot for display.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.commands.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_contains_list() {
        let mut registry = CommandRegistry::new();
        assert!(registry.add("restart"));
        assert!(registry.add("deploy"));
        assert!(!registry.add("deploy"));
        assert!(registry.contains("deploy"));
        assert!(!registry.contains("status"));
        assert_eq!(registry.list(), vec!["deploy", "restart"]);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut registry = CommandRegistry::new();
        registry.add("deploy");
        assert!(registry.remove("deploy").is_ok());
        assert!(matches!(
            registry.remove("deploy"),
            Err(GateError::NotFound(name)) if name == "deploy"
        ));
    }

    #[test]
    fn clear_empties() {
        let mut registry = CommandRegistry::new();
        registry.add("deploy");
        registry.clear();
        assert!(registry.list().is_empty());
    }
}
