//! Error types shared across the control core

use crate::command::CommandId;
use crate::resource::ResourceId;
use thiserror::Error;

/// Failure reported by a command callback.
///
/// The scheduler never propagates these out of a cycle: the failing command is
/// ended as interrupted and the loop carries on.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Subsystem fault: {0}")]
    Subsystem(String),

    #[error("Subsystem {0} is already borrowed")]
    Busy(String),

    #[error("Command fault: {0}")]
    Fault(String),
}

/// Misuse of the scheduler's composition API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown command: {0}")]
    UnknownCommand(CommandId),

    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceId),

    #[error("Default command {command} for {resource} does not require it")]
    DefaultMissingRequirement {
        resource: ResourceId,
        command: CommandId,
    },
}

/// Autonomous routine lookup failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("No autonomous routine named '{0}'")]
    NotFound(String),
}

/// Configuration loading and validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Composition failed: {0}")]
    Composition(#[from] SchedulerError),
}
