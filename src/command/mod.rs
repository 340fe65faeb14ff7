//! Commands: lifecycle-bound units of behaviour
//!
//! A command declares the resources it needs and implements up to four
//! lifecycle callbacks. The [`Scheduler`](crate::scheduler::Scheduler) owns
//! every command and drives it through
//!
//! ```text
//! Idle ──► Initializing ──► Running ──► Ending ──► Idle
//!                            │  ▲
//!                            └──┘ execute() once per cycle
//! ```
//!
//! `end` runs exactly once for every `initialize`, with `interrupted` set when
//! the command was displaced or cancelled rather than finishing on its own.

pub mod functional;
pub mod robot;

use crate::controller::frame::InputFrame;
use crate::error::CommandError;
use crate::resource::ResourceId;
use std::fmt;

pub use functional::FunctionalCommand;

/// Handle to a command registered with a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(usize);

impl CommandId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command#{}", self.0)
    }
}

/// What happens when another command wants one of our resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionBehavior {
    /// Yield: we get `end(true)` and the newcomer is admitted
    #[default]
    CancelSelf,
    /// Hold on: the newcomer is rejected
    CancelIncoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandState {
    #[default]
    Idle,
    Initializing,
    Running,
    Ending,
}

/// Capability interface every schedulable behaviour implements.
///
/// Commands are created once at composition time and may be scheduled many
/// times; anything they carry between runs must be reset in `initialize`.
/// No callback may block.
pub trait Command {
    fn name(&self) -> &str;

    /// Resources this command occupies while running. Empty means it never
    /// conflicts with anything.
    fn requirements(&self) -> &[ResourceId];

    fn interruption(&self) -> InterruptionBehavior {
        InterruptionBehavior::CancelSelf
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        Ok(())
    }

    fn execute(&mut self, _frame: &InputFrame) -> Result<(), CommandError> {
        Ok(())
    }

    /// Polled once per cycle, after `execute`
    fn is_finished(&mut self) -> bool {
        false
    }

    fn end(&mut self, _interrupted: bool) {}
}
