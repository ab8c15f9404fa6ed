pub mod catalog;
pub mod params;
pub mod suite;
pub mod validation;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use catalog::CommandRegistryEntry;
pub use params::{Nargs, NargsSymbol, ParamSpec, ParameterSchema};

/// Name of an invocable command, unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandIdentity(String);

impl CommandIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandIdentity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Host-provided command catalog. Consumed read-only.
pub trait CommandRegistry: Send + Sync {
    fn list_commands(&self) -> Vec<CommandIdentity>;
    fn get_schema(&self, command: &CommandIdentity) -> Option<ParameterSchema>;

    /// One-line description for menus. Hosts without descriptions keep the default.
    fn describe(&self, _command: &CommandIdentity) -> Option<String> {
        None
    }
}

/// Immutable copy of a registry taken once at startup and passed explicitly
/// to whoever needs it. Cheap to clone; safe to share across workers.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Arc<IndexMap<CommandIdentity, SnapshotEntry>>,
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    description: String,
    schema: ParameterSchema,
}

impl RegistrySnapshot {
    /// Capture every command the registry lists. Commands whose schema lookup
    /// fails are kept with an empty schema so they stay reachable.
    pub fn capture(registry: &dyn CommandRegistry) -> Self {
        let mut entries = IndexMap::new();
        for command in registry.list_commands() {
            let schema = registry.get_schema(&command).unwrap_or_else(|| {
                tracing::warn!(%command, "registry listed a command without a schema");
                ParameterSchema::default()
            });
            let description = registry.describe(&command).unwrap_or_default();
            entries.insert(command, SnapshotEntry { description, schema });
        }
        tracing::debug!(commands = entries.len(), "captured command registry");
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn list_commands(&self) -> impl Iterator<Item = &CommandIdentity> {
        self.entries.keys()
    }

    pub fn get_schema(&self, command: &CommandIdentity) -> Result<&ParameterSchema, AppError> {
        self.entries
            .get(command)
            .map(|e| &e.schema)
            .ok_or_else(|| AppError::UnknownCommand {
                name: command.to_string(),
            })
    }

    pub fn description(&self, command: &CommandIdentity) -> Option<&str> {
        self.entries.get(command).map(|e| e.description.as_str())
    }

    pub fn contains(&self, command: &CommandIdentity) -> bool {
        self.entries.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct TwoCommands;

    impl CommandRegistry for TwoCommands {
        fn list_commands(&self) -> Vec<CommandIdentity> {
            vec!["status".into(), "ghost".into()]
        }

        fn get_schema(&self, command: &CommandIdentity) -> Option<ParameterSchema> {
            (command.as_str() == "status")
                .then(|| ParameterSchema::new(vec![ParamSpec::new("path", "path")]))
        }
    }

    #[test]
    fn snapshot_keeps_listing_order_and_tolerates_missing_schema() {
        let snapshot = RegistrySnapshot::capture(&TwoCommands);
        let names: Vec<_> = snapshot.list_commands().map(CommandIdentity::as_str).collect();
        assert_eq!(names, ["status", "ghost"]);
        assert_eq!(snapshot.get_schema(&"status".into()).unwrap().params.len(), 1);
        assert!(snapshot.get_schema(&"ghost".into()).unwrap().params.is_empty());
    }

    #[test]
    fn unknown_command_is_an_error() {
        let snapshot = RegistrySnapshot::capture(&TwoCommands);
        let err = snapshot.get_schema(&"nope".into()).unwrap_err();
        assert_eq!(err, AppError::UnknownCommand { name: "nope".into() });
    }

    #[test]
    fn snapshot_clones_share_entries() {
        let snapshot = RegistrySnapshot::capture(&TwoCommands);
        let clone = snapshot.clone();
        assert!(Arc::ptr_eq(&snapshot.entries, &clone.entries));
    }
}
