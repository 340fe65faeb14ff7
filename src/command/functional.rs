//! Closure-backed commands for one-off behaviours

use crate::command::{Command, InterruptionBehavior};
use crate::controller::frame::InputFrame;
use crate::error::CommandError;
use crate::resource::ResourceId;

type InitFn = Box<dyn FnMut() -> Result<(), CommandError>>;
type ExecuteFn = Box<dyn FnMut(&InputFrame) -> Result<(), CommandError>>;
type FinishedFn = Box<dyn FnMut() -> bool>;
type EndFn = Box<dyn FnMut(bool)>;

/// A command assembled from optional closures.
///
/// Without an `until` closure it never finishes on its own.
pub struct FunctionalCommand {
    name: String,
    requirements: Vec<ResourceId>,
    interruption: InterruptionBehavior,
    on_init: Option<InitFn>,
    on_execute: Option<ExecuteFn>,
    until: Option<FinishedFn>,
    on_end: Option<EndFn>,
}

impl FunctionalCommand {
    pub fn new(name: impl Into<String>, requirements: Vec<ResourceId>) -> Self {
        Self {
            name: name.into(),
            requirements,
            interruption: InterruptionBehavior::CancelSelf,
            on_init: None,
            on_execute: None,
            until: None,
            on_end: None,
        }
    }

    /// Runs `action` once on initialize and finishes in the same cycle
    pub fn instant<F>(name: impl Into<String>, requirements: Vec<ResourceId>, mut action: F) -> Self
    where
        F: FnMut() -> Result<(), CommandError> + 'static,
    {
        Self::new(name, requirements)
            .with_init(move || action())
            .until(|| true)
    }

    /// Runs `action` every cycle until interrupted
    pub fn run<F>(name: impl Into<String>, requirements: Vec<ResourceId>, action: F) -> Self
    where
        F: FnMut(&InputFrame) -> Result<(), CommandError> + 'static,
    {
        Self::new(name, requirements).with_execute(action)
    }

    pub fn with_init<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> Result<(), CommandError> + 'static,
    {
        self.on_init = Some(Box::new(f));
        self
    }

    pub fn with_execute<F>(mut self, f: F) -> Self
    where
        F: FnMut(&InputFrame) -> Result<(), CommandError> + 'static,
    {
        self.on_execute = Some(Box::new(f));
        self
    }

    pub fn until<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> bool + 'static,
    {
        self.until = Some(Box::new(f));
        self
    }

    pub fn with_end<F>(mut self, f: F) -> Self
    where
        F: FnMut(bool) + 'static,
    {
        self.on_end = Some(Box::new(f));
        self
    }

    pub fn non_interruptible(mut self) -> Self {
        self.interruption = InterruptionBehavior::CancelIncoming;
        self
    }
}

impl Command for FunctionalCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn interruption(&self) -> InterruptionBehavior {
        self.interruption
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        match self.on_init.as_mut() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn execute(&mut self, frame: &InputFrame) -> Result<(), CommandError> {
        match self.on_execute.as_mut() {
            Some(f) => f(frame),
            None => Ok(()),
        }
    }

    fn is_finished(&mut self) -> bool {
        self.until.as_mut().is_some_and(|f| f())
    }

    fn end(&mut self, interrupted: bool) {
        if let Some(f) = self.on_end.as_mut() {
            f(interrupted);
        }
    }
}
