//! Composition root
//!
//! [`compose`] wires mechanisms, commands, triggers and autonomous routines
//! into a [`Robot`]. Nothing is global: the returned value owns the scheduler
//! and everything registered with it.

use crate::command::robot::{ArmToLimit, IntakeRun, MoveArm, ShootCommand, TeleopDrive, TimedDrive};
use crate::command::{CommandId, FunctionalCommand};
use crate::config::RobotConfig;
use crate::controller::frame::{Axis, Button, InputFrame};
use crate::error::{ConfigError, LookupError};
use crate::mapping::DriveMapper;
use crate::scheduler::{Admission, Scheduler};
use crate::subsystem::{Arm, Drivetrain, Hardware, Intake, Mechanism, Shooter};
use crate::trigger::Trigger;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resource-guarded handles to every mechanism
#[derive(Clone)]
pub struct Mechanisms {
    pub drivetrain: Mechanism<dyn Drivetrain>,
    pub shooter: Mechanism<dyn Shooter>,
    pub arm: Mechanism<dyn Arm>,
    pub intake: Mechanism<dyn Intake>,
}

/// Operator-facing commands created at composition time
#[derive(Debug, Clone, Copy)]
pub struct CommandSet {
    pub teleop: CommandId,
    pub zero_gyro: CommandId,
    pub lock: CommandId,
    pub shoot: CommandId,
    pub arm_up: CommandId,
    pub arm_down: CommandId,
    pub arm_raise: CommandId,
    pub arm_lower: CommandId,
    pub intake_in: CommandId,
    pub intake_trigger: CommandId,
    pub brake_on: CommandId,
    pub brake_off: CommandId,
}

pub struct Robot {
    scheduler: Scheduler,
    mechanisms: Mechanisms,
    commands: CommandSet,
    autonomous: BTreeMap<String, CommandId>,
    selected_autonomous: String,
}

pub fn compose(config: &RobotConfig, hardware: Hardware) -> Result<Robot, ConfigError> {
    config.validate()?;
    let mut scheduler = Scheduler::new();

    let mechanisms = Mechanisms {
        drivetrain: Mechanism::new(
            "drivetrain",
            scheduler.register_resource("drivetrain"),
            hardware.drivetrain,
        ),
        shooter: Mechanism::new(
            "shooter",
            scheduler.register_resource("shooter"),
            hardware.shooter,
        ),
        arm: Mechanism::new("arm", scheduler.register_resource("arm"), hardware.arm),
        intake: Mechanism::new(
            "intake",
            scheduler.register_resource("intake"),
            hardware.intake,
        ),
    };

    let mode = config.drive.mode_for(hardware.simulated);
    info!(
        "Composing {} robot with {:?} drive",
        if hardware.simulated { "simulated" } else { "hardware" },
        mode
    );
    let teleop = scheduler.register(Box::new(TeleopDrive::new(
        mechanisms.drivetrain.clone(),
        DriveMapper::new(mode, config.operator.deadbands),
        config.drive.slew_limits(),
        config.scheduler.period_secs(),
    )))?;
    scheduler.set_default_command(mechanisms.drivetrain.resource(), teleop)?;

    let m = &config.mechanisms;
    let commands = CommandSet {
        teleop,
        zero_gyro: scheduler.register(Box::new(drivetrain_action(
            "ZeroGyro",
            &mechanisms.drivetrain,
            |d| d.zero_gyro(),
        )))?,
        lock: scheduler.register(Box::new(lock_wheels(&mechanisms.drivetrain)))?,
        shoot: scheduler.register(Box::new(ShootCommand::new(
            mechanisms.shooter.clone(),
            m.shoot_speed,
        )))?,
        arm_up: scheduler.register(Box::new(ArmToLimit::up(
            mechanisms.arm.clone(),
            m.arm_limit_speed,
        )))?,
        arm_down: scheduler.register(Box::new(ArmToLimit::down(
            mechanisms.arm.clone(),
            m.arm_limit_speed,
        )))?,
        arm_raise: scheduler.register(Box::new(MoveArm::new(
            mechanisms.arm.clone(),
            m.arm_manual_speed,
        )))?,
        arm_lower: scheduler.register(Box::new(MoveArm::new(
            mechanisms.arm.clone(),
            -m.arm_manual_speed,
        )))?,
        intake_in: scheduler.register(Box::new(IntakeRun::new(
            mechanisms.intake.clone(),
            m.intake_bumper_speed,
        )))?,
        intake_trigger: scheduler.register(Box::new(IntakeRun::new(
            mechanisms.intake.clone(),
            m.intake_trigger_speed,
        )))?,
        brake_on: scheduler.register(Box::new(drivetrain_action(
            "BrakeOn",
            &mechanisms.drivetrain,
            |d| d.set_motor_brake(true),
        )))?,
        brake_off: scheduler.register(Box::new(drivetrain_action(
            "BrakeOff",
            &mechanisms.drivetrain,
            |d| d.set_motor_brake(false),
        )))?,
    };

    bind_controls(&mut scheduler, &commands, config.operator.trigger_threshold);

    let mut autonomous = BTreeMap::new();
    for routine in &config.autonomous.routines {
        let id = scheduler.register(Box::new(TimedDrive::new(
            routine.name.clone(),
            mechanisms.drivetrain.clone(),
            routine.setpoint(),
            routine.cycles(config.scheduler.cycle_period_ms),
        )))?;
        debug!("Autonomous routine '{}' registered as {}", routine.name, id);
        autonomous.insert(routine.name.clone(), id);
    }

    Ok(Robot {
        scheduler,
        mechanisms,
        commands,
        autonomous,
        selected_autonomous: config.autonomous.selected.clone(),
    })
}

/// Zero-requirement one-shot on the drivetrain. These run alongside
/// whatever is driving instead of interrupting it.
fn drivetrain_action<F>(
    name: &str,
    drivetrain: &Mechanism<dyn Drivetrain>,
    mut action: F,
) -> FunctionalCommand
where
    F: FnMut(&mut (dyn Drivetrain + 'static)) + 'static,
{
    let drivetrain = drivetrain.clone();
    FunctionalCommand::instant(name, Vec::new(), move || drivetrain.with(&mut action))
}

/// Holds the modules in an X while it runs, displacing teleop
fn lock_wheels(drivetrain: &Mechanism<dyn Drivetrain>) -> FunctionalCommand {
    let handle = drivetrain.clone();
    FunctionalCommand::run("LockWheels", vec![drivetrain.resource()], move |_| {
        handle.try_with(|d| d.lock())
    })
}

fn bind_controls(scheduler: &mut Scheduler, commands: &CommandSet, trigger_threshold: f64) {
    use crate::controller::frame::Port::{Driver, Operator};

    scheduler.add_trigger(Trigger::button(Driver, Button::A).on_true(commands.zero_gyro));
    scheduler.add_trigger(Trigger::button(Driver, Button::X).while_true(commands.lock));

    for (button, command) in [
        (Button::RightBumper, commands.shoot),
        (Button::A, commands.arm_down),
        (Button::B, commands.arm_up),
        (Button::Y, commands.arm_raise),
        (Button::X, commands.arm_lower),
        (Button::LeftBumper, commands.intake_in),
    ] {
        scheduler.add_trigger(Trigger::button(Operator, button).while_true(command));
    }

    scheduler.add_trigger(
        Trigger::axis_above(Operator, Axis::LeftTrigger, trigger_threshold)
            .while_true(commands.intake_trigger),
    );
}

impl Robot {
    /// One control cycle against a fresh input frame
    pub fn cycle(&mut self, frame: &InputFrame) {
        self.scheduler.run(frame);
    }

    pub fn autonomous_command(&self, name: &str) -> Result<CommandId, LookupError> {
        self.autonomous
            .get(name)
            .copied()
            .ok_or_else(|| LookupError::NotFound(name.to_string()))
    }

    /// The routine chosen in the config
    pub fn selected_autonomous(&self) -> Result<CommandId, LookupError> {
        self.autonomous_command(&self.selected_autonomous)
    }

    pub fn autonomous_routines(&self) -> impl Iterator<Item = &str> + '_ {
        self.autonomous.keys().map(String::as_str)
    }

    pub fn schedule(&mut self, id: CommandId) -> Admission {
        self.scheduler.schedule(id)
    }

    pub fn cancel(&mut self, id: CommandId) {
        self.scheduler.cancel(id);
    }

    pub fn cancel_all(&mut self) {
        self.scheduler.cancel_all();
    }

    /// Schedules the brake or coast action. A pending action from an
    /// earlier call is cancelled first so the latest request always applies.
    pub fn set_motor_brake(&mut self, brake: bool) -> Admission {
        let (id, other) = if brake {
            (self.commands.brake_on, self.commands.brake_off)
        } else {
            (self.commands.brake_off, self.commands.brake_on)
        };
        self.scheduler.cancel(other);
        self.scheduler.cancel(id);
        self.scheduler.schedule(id)
    }

    pub fn reset_heading(&mut self) -> Admission {
        self.scheduler.cancel(self.commands.zero_gyro);
        self.scheduler.schedule(self.commands.zero_gyro)
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    pub fn mechanisms(&self) -> &Mechanisms {
        &self.mechanisms
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
