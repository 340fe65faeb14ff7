//! Cooperative command scheduler with resource arbitration
//!
//! The scheduler owns every registered command and the resource registry.
//! Each call to [`Scheduler::run`] is one control cycle:
//!
//! 1. poll triggers and apply their schedule/cancel requests
//! 2. schedule the default command of every idle resource
//! 3. execute every running command in registration order, then check
//!    `is_finished` and end it if done
//! 4. release the resources of commands that ended
//!
//! Admission is the only serialization point for shared mechanisms: a command
//! is admitted only after every running command sharing one of its resources
//! has been interrupted, or it is rejected if one of them refuses to yield.

use crate::command::{Command, CommandId, CommandState, InterruptionBehavior};
use crate::controller::frame::InputFrame;
use crate::error::SchedulerError;
use crate::resource::{ResourceId, ResourceRegistry};
use crate::trigger::{Request, Trigger};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Outcome of a scheduling attempt
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    AlreadyRunning,
    /// A non-interruptible command holds one of the required resources
    Conflict { blocked_by: CommandId },
    /// `initialize` failed; the command was ended as interrupted
    InitializeFailed,
    UnknownCommand,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

struct Slot {
    command: Box<dyn Command>,
    requirements: Vec<ResourceId>,
    state: CommandState,
}

pub struct Scheduler {
    slots: Vec<Slot>,
    resources: ResourceRegistry,
    running: BTreeSet<CommandId>,
    triggers: Vec<Trigger>,
    requests: Vec<Request>,
    cycles: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            resources: ResourceRegistry::new(),
            running: BTreeSet::new(),
            triggers: Vec::new(),
            requests: Vec::new(),
            cycles: 0,
        }
    }

    pub fn register_resource(&mut self, name: impl Into<String>) -> ResourceId {
        self.resources.register(name)
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Takes ownership of a command. Its requirements are read once here.
    pub fn register(&mut self, command: Box<dyn Command>) -> Result<CommandId, SchedulerError> {
        let mut requirements = command.requirements().to_vec();
        requirements.sort();
        requirements.dedup();

        if let Some(unknown) = requirements.iter().find(|r| !self.resources.contains(**r)) {
            error!(
                "Command {} requires unregistered {}",
                command.name(),
                unknown
            );
            return Err(SchedulerError::UnknownResource(*unknown));
        }

        let id = CommandId::from_index(self.slots.len());
        debug!(
            "Registered {} as {} requiring {:?}",
            command.name(),
            id,
            requirements
        );
        self.slots.push(Slot {
            command,
            requirements,
            state: CommandState::Idle,
        });
        Ok(id)
    }

    pub fn add_trigger(&mut self, trigger: Trigger) {
        debug!(
            "Adding trigger {} with {} bindings",
            trigger.name(),
            trigger.bindings().len()
        );
        self.triggers.push(trigger);
    }

    /// Sets the command that runs on `resource` whenever nothing else
    /// occupies it. A running previous default is cancelled; the new one
    /// starts on the next cycle.
    pub fn set_default_command(
        &mut self,
        resource: ResourceId,
        command: CommandId,
    ) -> Result<(), SchedulerError> {
        if !self.resources.contains(resource) {
            return Err(SchedulerError::UnknownResource(resource));
        }
        let slot = self
            .slots
            .get(command.index())
            .ok_or(SchedulerError::UnknownCommand(command))?;
        if !slot.requirements.contains(&resource) {
            return Err(SchedulerError::DefaultMissingRequirement { resource, command });
        }

        let previous = self.resources.default_command(resource);
        if let Some(old) = previous.filter(|old| *old != command) {
            if self.running.contains(&old) {
                info!("Replacing running default {} on {}", self.name(old), resource);
                self.cancel(old);
            }
        }

        info!(
            "Default command for {} is now {}",
            self.resources.name(resource).unwrap_or("?"),
            self.name(command)
        );
        self.resources.set_default(resource, Some(command));
        Ok(())
    }

    pub fn remove_default_command(&mut self, resource: ResourceId) -> Option<CommandId> {
        let previous = self.resources.default_command(resource);
        self.resources.set_default(resource, None);
        previous
    }

    /// Tries to admit `id`, interrupting every interruptible command that
    /// shares a resource with it.
    pub fn schedule(&mut self, id: CommandId) -> Admission {
        let Some(slot) = self.slots.get(id.index()) else {
            error!("Attempt to schedule unknown {}", id);
            return Admission::UnknownCommand;
        };
        if self.running.contains(&id) {
            debug!("{} already running", slot.command.name());
            return Admission::AlreadyRunning;
        }

        let mut conflicts: Vec<CommandId> = slot
            .requirements
            .iter()
            .filter_map(|r| self.resources.occupant(*r))
            .collect();
        conflicts.sort();
        conflicts.dedup();

        if let Some(blocker) = conflicts.iter().copied().find(|c| {
            self.slots[c.index()].command.interruption() == InterruptionBehavior::CancelIncoming
        }) {
            warn!(
                "Rejected {}: {} is not interruptible",
                slot.command.name(),
                self.slots[blocker.index()].command.name()
            );
            return Admission::Conflict { blocked_by: blocker };
        }

        for conflict in conflicts {
            info!(
                "{} interrupts {}",
                self.name(id),
                self.name(conflict)
            );
            self.finish(conflict, true);
        }

        self.admit(id)
    }

    /// Interrupts `id` if it is running. Its resources fall back to their
    /// default commands at the next default pass.
    pub fn cancel(&mut self, id: CommandId) {
        if self.running.contains(&id) {
            info!("Cancelling {}", self.name(id));
            self.finish(id, true);
        } else {
            debug!("Cancel of idle {} ignored", id);
        }
    }

    /// Interrupts every running command
    pub fn cancel_all(&mut self) {
        let running: Vec<CommandId> = self.running.iter().copied().collect();
        if !running.is_empty() {
            info!("Cancelling all {} running commands", running.len());
        }
        for id in running {
            self.finish(id, true);
        }
    }

    /// One control cycle
    pub fn run(&mut self, frame: &InputFrame) {
        self.cycles += 1;

        let mut requests = std::mem::take(&mut self.requests);
        for trigger in &mut self.triggers {
            trigger.poll(frame, &mut requests);
        }
        for request in requests.drain(..) {
            match request {
                Request::Schedule(id) => {
                    let admission = self.schedule(id);
                    if !matches!(admission, Admission::Admitted | Admission::AlreadyRunning) {
                        debug!("Binding request for {} ended as {:?}", id, admission);
                    }
                }
                Request::Cancel(id) => self.cancel(id),
            }
        }
        self.requests = requests;

        self.schedule_defaults();

        let snapshot: Vec<CommandId> = self.running.iter().copied().collect();
        for id in snapshot {
            if !self.running.contains(&id) {
                continue;
            }
            let slot = &mut self.slots[id.index()];
            if slot.state != CommandState::Running {
                let state = slot.state;
                self.lifecycle_violation(id, &format!("execute while {:?}", state));
                continue;
            }

            if let Err(e) = slot.command.execute(frame) {
                error!("{} failed during execute: {}", slot.command.name(), e);
                self.finish(id, true);
                continue;
            }

            if slot.command.is_finished() {
                debug!("{} finished", slot.command.name());
                self.finish(id, false);
            }
        }
    }

    pub fn is_running(&self, id: CommandId) -> bool {
        self.running.contains(&id)
    }

    pub fn state(&self, id: CommandId) -> Option<CommandState> {
        self.slots.get(id.index()).map(|s| s.state)
    }

    /// Running commands in registration order
    pub fn running(&self) -> impl Iterator<Item = CommandId> + '_ {
        self.running.iter().copied()
    }

    pub fn occupant(&self, resource: ResourceId) -> Option<CommandId> {
        self.resources.occupant(resource)
    }

    pub fn name(&self, id: CommandId) -> &str {
        self.slots
            .get(id.index())
            .map(|s| s.command.name())
            .unwrap_or("<unknown>")
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn schedule_defaults(&mut self) {
        let pending: Vec<CommandId> = self
            .resources
            .defaults()
            .filter(|(resource, command)| {
                self.resources.occupant(*resource).is_none() && !self.running.contains(command)
            })
            .map(|(_, command)| command)
            .collect();

        for command in pending {
            // A default never displaces another command
            let free = self.slots[command.index()]
                .requirements
                .iter()
                .all(|r| self.resources.occupant(*r).is_none());
            if !free || self.running.contains(&command) {
                continue;
            }
            debug!("Starting default command {}", self.name(command));
            let _ = self.admit(command);
        }
    }

    fn admit(&mut self, id: CommandId) -> Admission {
        let slot = &mut self.slots[id.index()];
        if slot.state != CommandState::Idle {
            let state = slot.state;
            self.lifecycle_violation(id, &format!("admitted while {:?}", state));
            return Admission::AlreadyRunning;
        }

        slot.state = CommandState::Initializing;
        info!("Initializing {}", slot.command.name());
        match slot.command.initialize() {
            Ok(()) => {
                slot.state = CommandState::Running;
                for resource in &slot.requirements {
                    self.resources.occupy(*resource, id);
                }
                self.running.insert(id);
                Admission::Admitted
            }
            Err(e) => {
                error!("{} failed to initialize: {}", slot.command.name(), e);
                slot.state = CommandState::Ending;
                slot.command.end(true);
                slot.state = CommandState::Idle;
                Admission::InitializeFailed
            }
        }
    }

    fn finish(&mut self, id: CommandId, interrupted: bool) {
        let slot = &mut self.slots[id.index()];
        if !matches!(
            slot.state,
            CommandState::Running | CommandState::Initializing
        ) {
            let state = slot.state;
            self.lifecycle_violation(id, &format!("end while {:?}", state));
            return;
        }

        slot.state = CommandState::Ending;
        slot.command.end(interrupted);
        slot.state = CommandState::Idle;
        info!(
            "{} ended{}",
            slot.command.name(),
            if interrupted { " (interrupted)" } else { "" }
        );

        self.running.remove(&id);
        for resource in &slot.requirements {
            self.resources.release(*resource, id);
        }
    }

    fn lifecycle_violation(&self, id: CommandId, what: &str) {
        error!("Lifecycle violation on {} ({}): {}", self.name(id), id, what);
        debug_assert!(false, "lifecycle violation on {}: {}", id, what);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FunctionalCommand;
    use crate::error::CommandError;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn probe(name: &'static str, requirements: Vec<ResourceId>, log: &Log) -> FunctionalCommand {
        let (init, exec, end) = (log.clone(), log.clone(), log.clone());
        FunctionalCommand::new(name, requirements)
            .with_init(move || {
                init.borrow_mut().push(format!("{name}:init"));
                Ok(())
            })
            .with_execute(move |_| {
                exec.borrow_mut().push(format!("{name}:exec"));
                Ok(())
            })
            .with_end(move |interrupted| {
                end.borrow_mut().push(format!("{name}:end({interrupted})"));
            })
    }

    #[test]
    fn initialize_runs_before_first_execute() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let cmd = scheduler.register(Box::new(probe("a", vec![], &log))).unwrap();

        assert_eq!(scheduler.schedule(cmd), Admission::Admitted);
        assert_eq!(scheduler.state(cmd), Some(CommandState::Running));
        scheduler.run(&InputFrame::neutral());

        assert_eq!(*log.borrow(), vec!["a:init", "a:exec"]);
    }

    #[test]
    fn scheduling_twice_is_a_no_op() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let cmd = scheduler.register(Box::new(probe("a", vec![], &log))).unwrap();

        assert!(scheduler.schedule(cmd).is_admitted());
        assert_eq!(scheduler.schedule(cmd), Admission::AlreadyRunning);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn conflict_interrupts_interruptible_occupant() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let arm = scheduler.register_resource("arm");
        let up = scheduler.register(Box::new(probe("up", vec![arm], &log))).unwrap();
        let down = scheduler.register(Box::new(probe("down", vec![arm], &log))).unwrap();

        assert!(scheduler.schedule(up).is_admitted());
        assert!(scheduler.schedule(down).is_admitted());

        assert!(!scheduler.is_running(up));
        assert!(scheduler.is_running(down));
        assert_eq!(scheduler.occupant(arm), Some(down));
        assert_eq!(
            *log.borrow(),
            vec!["up:init", "up:end(true)", "down:init"]
        );
    }

    #[test]
    fn non_interruptible_occupant_rejects_newcomer() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let arm = scheduler.register_resource("arm");
        let holder = scheduler
            .register(Box::new(probe("hold", vec![arm], &log).non_interruptible()))
            .unwrap();
        let other = scheduler.register(Box::new(probe("other", vec![arm], &log))).unwrap();

        assert!(scheduler.schedule(holder).is_admitted());
        assert_eq!(
            scheduler.schedule(other),
            Admission::Conflict { blocked_by: holder }
        );
        assert!(scheduler.is_running(holder));
        assert_eq!(scheduler.state(other), Some(CommandState::Idle));
    }

    #[test]
    fn rejection_cancels_nothing() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let arm = scheduler.register_resource("arm");
        let intake = scheduler.register_resource("intake");
        let soft = scheduler.register(Box::new(probe("soft", vec![intake], &log))).unwrap();
        let hard = scheduler
            .register(Box::new(probe("hard", vec![arm], &log).non_interruptible()))
            .unwrap();
        let both = scheduler
            .register(Box::new(probe("both", vec![arm, intake], &log)))
            .unwrap();

        assert!(scheduler.schedule(soft).is_admitted());
        assert!(scheduler.schedule(hard).is_admitted());
        assert!(!scheduler.schedule(both).is_admitted());
        assert!(scheduler.is_running(soft));
        assert!(scheduler.is_running(hard));
    }

    #[test]
    fn finishing_command_ends_uninterrupted() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let cmd = scheduler
            .register(Box::new(probe("once", vec![], &log).until(|| true)))
            .unwrap();

        assert!(scheduler.schedule(cmd).is_admitted());
        scheduler.run(&InputFrame::neutral());

        assert!(!scheduler.is_running(cmd));
        assert_eq!(*log.borrow(), vec!["once:init", "once:exec", "once:end(false)"]);
    }

    #[test]
    fn failing_execute_is_ended_as_interrupted() {
        let ended = Rc::new(RefCell::new(None));
        let seen = ended.clone();
        let mut scheduler = Scheduler::new();
        let cmd = scheduler
            .register(Box::new(
                FunctionalCommand::run("broken", vec![], |_| {
                    Err(CommandError::Fault("stalled".into()))
                })
                .with_end(move |interrupted| *seen.borrow_mut() = Some(interrupted)),
            ))
            .unwrap();

        assert!(scheduler.schedule(cmd).is_admitted());
        scheduler.run(&InputFrame::neutral());

        assert!(!scheduler.is_running(cmd));
        assert_eq!(*ended.borrow(), Some(true));
    }

    #[test]
    fn failing_initialize_still_gets_end() {
        let log = Log::default();
        let end_log = log.clone();
        let mut scheduler = Scheduler::new();
        let arm = scheduler.register_resource("arm");
        let cmd = scheduler
            .register(Box::new(
                FunctionalCommand::new("bad", vec![arm])
                    .with_init(|| Err(CommandError::Subsystem("arm offline".into())))
                    .with_end(move |i| end_log.borrow_mut().push(format!("end({i})"))),
            ))
            .unwrap();

        assert_eq!(scheduler.schedule(cmd), Admission::InitializeFailed);
        assert_eq!(scheduler.occupant(arm), None);
        assert_eq!(*log.borrow(), vec!["end(true)"]);
    }

    #[test]
    fn default_command_runs_on_idle_resource_and_yields() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let drive = scheduler.register_resource("drive");
        let teleop = scheduler.register(Box::new(probe("teleop", vec![drive], &log))).unwrap();
        let lock = scheduler.register(Box::new(probe("lock", vec![drive], &log))).unwrap();
        scheduler.set_default_command(drive, teleop).unwrap();

        scheduler.run(&InputFrame::neutral());
        assert!(scheduler.is_running(teleop));

        assert!(scheduler.schedule(lock).is_admitted());
        assert!(!scheduler.is_running(teleop));

        scheduler.cancel(lock);
        scheduler.run(&InputFrame::neutral());
        assert!(scheduler.is_running(teleop));
    }

    #[test]
    fn default_must_require_its_resource() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let drive = scheduler.register_resource("drive");
        let floating = scheduler.register(Box::new(probe("floating", vec![], &log))).unwrap();

        assert!(matches!(
            scheduler.set_default_command(drive, floating),
            Err(SchedulerError::DefaultMissingRequirement { .. })
        ));
    }

    #[test]
    fn replacing_default_cancels_running_one() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let drive = scheduler.register_resource("drive");
        let rate = scheduler.register(Box::new(probe("rate", vec![drive], &log))).unwrap();
        let angle = scheduler.register(Box::new(probe("angle", vec![drive], &log))).unwrap();

        scheduler.set_default_command(drive, rate).unwrap();
        scheduler.run(&InputFrame::neutral());
        scheduler.set_default_command(drive, angle).unwrap();
        assert!(!scheduler.is_running(rate));

        scheduler.run(&InputFrame::neutral());
        assert!(scheduler.is_running(angle));
    }

    #[test]
    fn removed_default_is_not_restarted() {
        let log = Log::default();
        let mut scheduler = Scheduler::new();
        let drive = scheduler.register_resource("drive");
        let teleop = scheduler.register(Box::new(probe("teleop", vec![drive], &log))).unwrap();
        scheduler.set_default_command(drive, teleop).unwrap();

        scheduler.run(&InputFrame::neutral());
        scheduler.cancel(teleop);
        assert_eq!(scheduler.remove_default_command(drive), Some(teleop));

        scheduler.run(&InputFrame::neutral());
        assert!(!scheduler.is_running(teleop));
        assert_eq!(scheduler.occupant(drive), None);
    }

    #[test]
    fn unregistered_requirement_is_refused() {
        let log = Log::default();
        let mut other = ResourceRegistry::new();
        other.register("a");
        let foreign = other.register("b");

        let mut scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.register(Box::new(probe("x", vec![foreign], &log))),
            Err(SchedulerError::UnknownResource(_))
        ));
    }

    #[test]
    fn drop_ends_running_commands() {
        let log = Log::default();
        {
            let mut scheduler = Scheduler::new();
            let cmd = scheduler.register(Box::new(probe("a", vec![], &log))).unwrap();
            assert!(scheduler.schedule(cmd).is_admitted());
        }
        assert_eq!(*log.borrow(), vec!["a:init", "a:end(true)"]);
    }
}
