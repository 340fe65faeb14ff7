//! Registry of exclusively claimable mechanisms
//!
//! A [`ResourceId`] is an opaque handle for one physical mechanism (drivetrain,
//! shooter, arm, intake). The registry records which command currently
//! occupies each resource and which command runs on it by default.

use crate::command::CommandId;
use std::fmt;
use tracing::debug;

/// Handle to one physical mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

#[derive(Debug)]
struct ResourceEntry {
    name: String,
    default_command: Option<CommandId>,
    occupant: Option<CommandId>,
}

/// Resources are created at composition time and live for the whole process.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Vec<ResourceEntry>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new mechanism and returns its handle
    pub fn register(&mut self, name: impl Into<String>) -> ResourceId {
        let name = name.into();
        let id = ResourceId(self.entries.len());
        debug!("Registered {} as {}", name, id);
        self.entries.push(ResourceEntry {
            name,
            default_command: None,
            occupant: None,
        });
        id
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        id.0 < self.entries.len()
    }

    pub fn name(&self, id: ResourceId) -> Option<&str> {
        self.entries.get(id.0).map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        (0..self.entries.len()).map(ResourceId)
    }

    pub fn occupant(&self, id: ResourceId) -> Option<CommandId> {
        self.entries.get(id.0).and_then(|e| e.occupant)
    }

    pub fn default_command(&self, id: ResourceId) -> Option<CommandId> {
        self.entries.get(id.0).and_then(|e| e.default_command)
    }

    /// Resources that have a default command configured, paired with it
    pub fn defaults(&self) -> impl Iterator<Item = (ResourceId, CommandId)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| e.default_command.map(|cmd| (ResourceId(idx), cmd)))
    }

    pub(crate) fn set_default(&mut self, id: ResourceId, command: Option<CommandId>) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.default_command = command;
        }
    }

    pub(crate) fn occupy(&mut self, id: ResourceId, command: CommandId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.occupant = Some(command);
        }
    }

    /// Clears the occupant, but only if it is still `command`
    pub(crate) fn release(&mut self, id: ResourceId, command: CommandId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            if entry.occupant == Some(command) {
                entry.occupant = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_hands_out_distinct_ids() {
        let mut registry = ResourceRegistry::new();
        let drive = registry.register("drivetrain");
        let arm = registry.register("arm");

        assert_ne!(drive, arm);
        assert_eq!(registry.name(drive), Some("drivetrain"));
        assert_eq!(registry.name(arm), Some("arm"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn release_ignores_stale_owner() {
        let mut registry = ResourceRegistry::new();
        let arm = registry.register("arm");
        let first = CommandId::from_index(0);
        let second = CommandId::from_index(1);

        registry.occupy(arm, first);
        registry.occupy(arm, second);
        registry.release(arm, first);
        assert_eq!(registry.occupant(arm), Some(second));

        registry.release(arm, second);
        assert_eq!(registry.occupant(arm), None);
    }
}
