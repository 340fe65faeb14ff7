//! Commands for the robot's mechanisms

use crate::command::Command;
use crate::controller::frame::InputFrame;
use crate::error::CommandError;
use crate::mapping::{DriveMapper, DriveSetpoint, PlanarSlewLimiter, RotationInput, SlewRateLimiter};
use crate::resource::ResourceId;
use crate::subsystem::{Arm, Drivetrain, Intake, Mechanism, Shooter};
use tracing::{debug, warn};

/// Best-effort safe-state call from `end`, which cannot fail
fn stop<T: ?Sized>(
    mechanism: &Mechanism<T>,
    f: impl FnOnce(&mut T) -> Result<(), CommandError>,
) {
    if let Err(e) = mechanism.try_with(f) {
        warn!("Failed to stop {}: {}", mechanism.name(), e);
    }
}

/// Spins the shooter at a target speed for as long as it is held
pub struct ShootCommand {
    name: String,
    shooter: Mechanism<dyn Shooter>,
    requirements: [ResourceId; 1],
    speed: f64,
}

impl ShootCommand {
    pub fn new(shooter: Mechanism<dyn Shooter>, speed: f64) -> Self {
        Self {
            name: format!("Shoot({speed})"),
            requirements: [shooter.resource()],
            shooter,
            speed,
        }
    }
}

impl Command for ShootCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        let speed = self.speed;
        self.shooter.try_with(|s| s.set_target_speed(speed))
    }

    fn end(&mut self, _interrupted: bool) {
        stop(&self.shooter, |s| s.set_target_speed(0.0));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmLimit {
    Upper,
    Lower,
}

/// Drives the arm toward one of its end stops and finishes there
pub struct ArmToLimit {
    name: &'static str,
    arm: Mechanism<dyn Arm>,
    requirements: [ResourceId; 1],
    limit: ArmLimit,
    speed: f64,
}

impl ArmToLimit {
    pub fn up(arm: Mechanism<dyn Arm>, speed: f64) -> Self {
        Self::new("ArmUp", arm, ArmLimit::Upper, speed.abs())
    }

    pub fn down(arm: Mechanism<dyn Arm>, speed: f64) -> Self {
        Self::new("ArmDown", arm, ArmLimit::Lower, -speed.abs())
    }

    fn new(name: &'static str, arm: Mechanism<dyn Arm>, limit: ArmLimit, speed: f64) -> Self {
        Self {
            name,
            requirements: [arm.resource()],
            arm,
            limit,
            speed,
        }
    }

    fn at_limit(&self) -> Result<bool, CommandError> {
        self.arm.read(|a| match self.limit {
            ArmLimit::Upper => a.at_upper_limit(),
            ArmLimit::Lower => a.at_lower_limit(),
        })
    }
}

impl Command for ArmToLimit {
    fn name(&self) -> &str {
        self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn execute(&mut self, _frame: &InputFrame) -> Result<(), CommandError> {
        if self.at_limit()? {
            return Ok(());
        }
        let speed = self.speed;
        self.arm.try_with(|a| a.set_speed(speed))
    }

    fn is_finished(&mut self) -> bool {
        self.at_limit().unwrap_or(false)
    }

    fn end(&mut self, interrupted: bool) {
        if !interrupted {
            debug!("{} reached {:?} limit", self.name, self.limit);
        }
        stop(&self.arm, |a| a.set_speed(0.0));
    }
}

/// Runs the arm at a fixed speed until interrupted
pub struct MoveArm {
    name: String,
    arm: Mechanism<dyn Arm>,
    requirements: [ResourceId; 1],
    speed: f64,
}

impl MoveArm {
    pub fn new(arm: Mechanism<dyn Arm>, speed: f64) -> Self {
        Self {
            name: format!("MoveArm({speed})"),
            requirements: [arm.resource()],
            arm,
            speed,
        }
    }
}

impl Command for MoveArm {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn execute(&mut self, _frame: &InputFrame) -> Result<(), CommandError> {
        let speed = self.speed;
        self.arm.try_with(|a| a.set_speed(speed))
    }

    fn end(&mut self, _interrupted: bool) {
        stop(&self.arm, |a| a.set_speed(0.0));
    }
}

/// Runs the intake rollers until interrupted
pub struct IntakeRun {
    name: String,
    intake: Mechanism<dyn Intake>,
    requirements: [ResourceId; 1],
    speed: f64,
}

impl IntakeRun {
    pub fn new(intake: Mechanism<dyn Intake>, speed: f64) -> Self {
        Self {
            name: format!("IntakeRun({speed})"),
            requirements: [intake.resource()],
            intake,
            speed,
        }
    }
}

impl Command for IntakeRun {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        let speed = self.speed;
        self.intake.try_with(|i| i.set_speed(speed))
    }

    fn end(&mut self, _interrupted: bool) {
        stop(&self.intake, |i| i.set_speed(0.0));
    }
}

/// Slew limits applied by [`TeleopDrive`], in units per second
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlewLimits {
    pub translation: Option<f64>,
    pub rotation: Option<f64>,
}

/// Field-oriented driver control, the drivetrain's default command.
///
/// Translation slew limiting bounds the change of the whole (forward, strafe)
/// vector, so a stick reversal ramps through zero. A centered heading stick
/// holds the last heading target.
pub struct TeleopDrive {
    name: String,
    drivetrain: Mechanism<dyn Drivetrain>,
    requirements: [ResourceId; 1],
    mapper: DriveMapper,
    period_secs: f64,
    translation_limiter: Option<PlanarSlewLimiter>,
    rotation_limiter: Option<SlewRateLimiter>,
    heading_target: f64,
}

impl TeleopDrive {
    pub fn new(
        drivetrain: Mechanism<dyn Drivetrain>,
        mapper: DriveMapper,
        slew: SlewLimits,
        period_secs: f64,
    ) -> Self {
        Self {
            name: format!("TeleopDrive({:?})", mapper.mode()),
            requirements: [drivetrain.resource()],
            drivetrain,
            mapper,
            period_secs,
            translation_limiter: slew.translation.map(PlanarSlewLimiter::new),
            rotation_limiter: slew.rotation.map(SlewRateLimiter::new),
            heading_target: 0.0,
        }
    }

    fn limit_translation(&mut self, forward: f64, strafe: f64) -> (f64, f64) {
        let magnitude = forward.hypot(strafe);
        let target = if magnitude > 1.0 {
            (forward / magnitude, strafe / magnitude)
        } else {
            (forward, strafe)
        };
        match self.translation_limiter.as_mut() {
            Some(limiter) => limiter.calculate(target, self.period_secs),
            None => target,
        }
    }
}

impl Command for TeleopDrive {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        if let Some(limiter) = self.translation_limiter.as_mut() {
            limiter.reset((0.0, 0.0));
        }
        if let Some(limiter) = self.rotation_limiter.as_mut() {
            limiter.reset(0.0);
        }
        self.heading_target = self.drivetrain.read(|d| d.heading())?;
        Ok(())
    }

    fn execute(&mut self, frame: &InputFrame) -> Result<(), CommandError> {
        let input = self.mapper.map(frame);
        let (forward, strafe) = self.limit_translation(input.forward, input.strafe);

        let setpoint = match input.rotation {
            RotationInput::Rate(rate) => {
                let rotation = match self.rotation_limiter.as_mut() {
                    Some(limiter) => limiter.calculate(rate, self.period_secs),
                    None => rate,
                };
                DriveSetpoint::Velocity {
                    forward,
                    strafe,
                    rotation,
                }
            }
            RotationInput::Heading(target) => {
                if let Some(target) = target {
                    self.heading_target = target;
                }
                DriveSetpoint::Heading {
                    forward,
                    strafe,
                    heading: self.heading_target,
                }
            }
        };

        self.drivetrain.try_with(|d| d.drive(setpoint))
    }

    fn end(&mut self, _interrupted: bool) {
        stop(&self.drivetrain, |d| d.drive(DriveSetpoint::STOP));
    }
}

/// Autonomous routine: holds a drive setpoint for a fixed number of cycles
pub struct TimedDrive {
    name: String,
    drivetrain: Mechanism<dyn Drivetrain>,
    requirements: [ResourceId; 1],
    setpoint: DriveSetpoint,
    cycles: u32,
    remaining: u32,
}

impl TimedDrive {
    pub fn new(
        name: impl Into<String>,
        drivetrain: Mechanism<dyn Drivetrain>,
        setpoint: DriveSetpoint,
        cycles: u32,
    ) -> Self {
        Self {
            name: name.into(),
            requirements: [drivetrain.resource()],
            drivetrain,
            setpoint,
            cycles,
            remaining: cycles,
        }
    }
}

impl Command for TimedDrive {
    fn name(&self) -> &str {
        &self.name
    }

    fn requirements(&self) -> &[ResourceId] {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), CommandError> {
        self.remaining = self.cycles;
        Ok(())
    }

    fn execute(&mut self, _frame: &InputFrame) -> Result<(), CommandError> {
        let setpoint = self.setpoint;
        self.drivetrain.try_with(|d| d.drive(setpoint))?;
        self.remaining = self.remaining.saturating_sub(1);
        Ok(())
    }

    fn is_finished(&mut self) -> bool {
        self.remaining == 0
    }

    fn end(&mut self, _interrupted: bool) {
        stop(&self.drivetrain, |d| d.drive(DriveSetpoint::STOP));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FunctionalCommand;
    use crate::controller::frame::{Axis, Port};
    use crate::mapping::{Deadbands, DriveMode};
    use crate::scheduler::Scheduler;
    use crate::subsystem::sim::SimRobot;

    struct Rig {
        scheduler: Scheduler,
        sim: SimRobot,
        drivetrain: Mechanism<dyn Drivetrain>,
        arm: Mechanism<dyn Arm>,
        shooter: Mechanism<dyn Shooter>,
        intake: Mechanism<dyn Intake>,
    }

    fn rig() -> Rig {
        let mut scheduler = Scheduler::new();
        let sim = SimRobot::new(0.02);
        let hw = sim.hardware();
        Rig {
            drivetrain: Mechanism::new(
                "drivetrain",
                scheduler.register_resource("drivetrain"),
                hw.drivetrain,
            ),
            shooter: Mechanism::new("shooter", scheduler.register_resource("shooter"), hw.shooter),
            arm: Mechanism::new("arm", scheduler.register_resource("arm"), hw.arm),
            intake: Mechanism::new("intake", scheduler.register_resource("intake"), hw.intake),
            scheduler,
            sim,
        }
    }

    #[test]
    fn shooter_spins_while_held_and_stops_on_release() {
        let mut rig = rig();
        let shoot = rig
            .scheduler
            .register(Box::new(ShootCommand::new(rig.shooter.clone(), 1.0)))
            .unwrap();

        assert!(rig.scheduler.schedule(shoot).is_admitted());
        assert_eq!(rig.sim.shooter.borrow().target_speed(), 1.0);

        rig.scheduler.run(&InputFrame::neutral());
        assert!(rig.scheduler.is_running(shoot));

        rig.scheduler.cancel(shoot);
        assert_eq!(rig.sim.shooter.borrow().target_speed(), 0.0);
    }

    #[test]
    fn arm_up_finishes_at_upper_limit() {
        let mut rig = rig();
        let up = rig
            .scheduler
            .register(Box::new(ArmToLimit::up(rig.arm.clone(), 1.0)))
            .unwrap();

        assert!(rig.scheduler.schedule(up).is_admitted());
        for _ in 0..100 {
            rig.scheduler.run(&InputFrame::neutral());
            if !rig.scheduler.is_running(up) {
                break;
            }
        }

        assert!(!rig.scheduler.is_running(up));
        let arm = rig.sim.arm.borrow();
        assert!(arm.at_upper_limit());
        assert_eq!(arm.speed(), 0.0);
    }

    #[test]
    fn arm_down_moves_toward_lower_limit() {
        let mut rig = rig();
        let down = rig
            .scheduler
            .register(Box::new(ArmToLimit::down(rig.arm.clone(), 0.5)))
            .unwrap();
        let start = rig.sim.arm.borrow().position();

        assert!(rig.scheduler.schedule(down).is_admitted());
        rig.scheduler.run(&InputFrame::neutral());
        assert!(rig.sim.arm.borrow().position() < start);
    }

    #[test]
    fn manual_arm_and_limit_command_share_the_arm() {
        let mut rig = rig();
        let manual = rig
            .scheduler
            .register(Box::new(MoveArm::new(rig.arm.clone(), 0.7)))
            .unwrap();
        let down = rig
            .scheduler
            .register(Box::new(ArmToLimit::down(rig.arm.clone(), 0.5)))
            .unwrap();

        assert!(rig.scheduler.schedule(manual).is_admitted());
        rig.scheduler.run(&InputFrame::neutral());
        assert!(rig.scheduler.schedule(down).is_admitted());
        assert!(!rig.scheduler.is_running(manual));
    }

    #[test]
    fn intake_and_shooter_run_together() {
        let mut rig = rig();
        let intake = rig
            .scheduler
            .register(Box::new(IntakeRun::new(rig.intake.clone(), -1.0)))
            .unwrap();
        let shoot = rig
            .scheduler
            .register(Box::new(ShootCommand::new(rig.shooter.clone(), 1.0)))
            .unwrap();

        assert!(rig.scheduler.schedule(intake).is_admitted());
        assert!(rig.scheduler.schedule(shoot).is_admitted());
        assert_eq!(rig.sim.intake.borrow().speed(), -1.0);

        rig.scheduler.cancel_all();
        assert_eq!(rig.sim.intake.borrow().speed(), 0.0);
    }

    #[test]
    fn teleop_sends_field_oriented_velocity() {
        let mut rig = rig();
        let teleop = rig
            .scheduler
            .register(Box::new(TeleopDrive::new(
                rig.drivetrain.clone(),
                DriveMapper::new(DriveMode::AngularVelocity, Deadbands::default()),
                SlewLimits::default(),
                0.02,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());

        let frame = InputFrame::builder()
            .axis(Port::Driver, Axis::LeftY, -1.0)
            .axis(Port::Driver, Axis::RightX, 0.05)
            .build();
        rig.scheduler.run(&frame);

        assert_eq!(
            rig.sim.drivetrain.borrow().last_setpoint(),
            DriveSetpoint::Velocity {
                forward: 1.0,
                strafe: 0.0,
                rotation: 0.0
            }
        );
    }

    #[test]
    fn translation_ramps_under_slew_limit() {
        let mut rig = rig();
        let teleop = rig
            .scheduler
            .register(Box::new(TeleopDrive::new(
                rig.drivetrain.clone(),
                DriveMapper::new(DriveMode::AngularVelocity, Deadbands::default()),
                SlewLimits {
                    translation: Some(5.0),
                    rotation: None,
                },
                0.02,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());

        let full_left = InputFrame::builder()
            .axis(Port::Driver, Axis::LeftX, -1.0)
            .build();
        rig.scheduler.run(&full_left);

        let setpoint = rig.sim.drivetrain.borrow().last_setpoint();
        match setpoint {
            DriveSetpoint::Velocity { forward, strafe, .. } => {
                assert!(forward.abs() < 1e-12);
                assert!((strafe - 0.1).abs() < 1e-12);
            }
            other => panic!("unexpected setpoint {:?}", other),
        }
    }

    #[test]
    fn direct_angle_holds_heading_when_stick_released() {
        let mut rig = rig();
        let teleop = rig
            .scheduler
            .register(Box::new(TeleopDrive::new(
                rig.drivetrain.clone(),
                DriveMapper::new(DriveMode::DirectAngle, Deadbands::default()),
                SlewLimits::default(),
                0.02,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());

        let point_left = InputFrame::builder()
            .axis(Port::Driver, Axis::RightX, -1.0)
            .build();
        rig.scheduler.run(&point_left);
        rig.scheduler.run(&InputFrame::neutral());

        let setpoint = rig.sim.drivetrain.borrow().last_setpoint();
        match setpoint {
            DriveSetpoint::Heading { heading, .. } => {
                assert!((heading - std::f64::consts::FRAC_PI_2).abs() < 1e-12)
            }
            other => panic!("unexpected setpoint {:?}", other),
        }
    }

    #[test]
    fn teleop_starts_from_current_heading() {
        let mut rig = rig();
        rig.sim.drivetrain.borrow_mut().set_heading(1.0);
        let teleop = rig
            .scheduler
            .register(Box::new(TeleopDrive::new(
                rig.drivetrain.clone(),
                DriveMapper::new(DriveMode::DirectAngle, Deadbands::default()),
                SlewLimits::default(),
                0.02,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());
        rig.scheduler.run(&InputFrame::neutral());

        assert!((rig.sim.drivetrain.borrow().heading() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn drive_fault_ends_teleop() {
        let mut rig = rig();
        let teleop = rig
            .scheduler
            .register(Box::new(TeleopDrive::new(
                rig.drivetrain.clone(),
                DriveMapper::new(DriveMode::AngularVelocity, Deadbands::default()),
                SlewLimits::default(),
                0.02,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());

        rig.sim
            .drivetrain
            .borrow_mut()
            .inject_fault(Some("brownout".into()));
        rig.scheduler.run(&InputFrame::neutral());
        assert!(!rig.scheduler.is_running(teleop));
    }

    #[test]
    fn timed_drive_finishes_after_its_cycles() {
        let mut rig = rig();
        let setpoint = DriveSetpoint::Velocity {
            forward: 0.5,
            strafe: 0.0,
            rotation: 0.0,
        };
        let auto = rig
            .scheduler
            .register(Box::new(TimedDrive::new(
                "New Auto",
                rig.drivetrain.clone(),
                setpoint,
                3,
            )))
            .unwrap();
        assert!(rig.scheduler.schedule(auto).is_admitted());

        for _ in 0..2 {
            rig.scheduler.run(&InputFrame::neutral());
            assert_eq!(rig.sim.drivetrain.borrow().last_setpoint(), setpoint);
        }
        rig.scheduler.run(&InputFrame::neutral());
        assert!(!rig.scheduler.is_running(auto));
        assert_eq!(
            rig.sim.drivetrain.borrow().last_setpoint(),
            DriveSetpoint::STOP
        );
    }

    fn translation(rig: &Rig) -> (f64, f64) {
        let setpoint = rig.sim.drivetrain.borrow().last_setpoint();
        match setpoint {
            DriveSetpoint::Velocity { forward, strafe, .. }
            | DriveSetpoint::Heading { forward, strafe, .. } => (forward, strafe),
        }
    }

    fn slewed_teleop(rig: &Rig, rate: f64) -> TeleopDrive {
        TeleopDrive::new(
            rig.drivetrain.clone(),
            DriveMapper::new(DriveMode::AngularVelocity, Deadbands::default()),
            SlewLimits {
                translation: Some(rate),
                rotation: None,
            },
            0.02,
        )
    }

    #[test]
    fn stick_reversal_ramps_through_zero() {
        let mut rig = rig();
        let teleop = slewed_teleop(&rig, 2.0);
        let teleop = rig.scheduler.register(Box::new(teleop)).unwrap();
        assert!(rig.scheduler.schedule(teleop).is_admitted());

        let ahead = InputFrame::builder().axis(Port::Driver, Axis::LeftY, -1.0).build();
        let back = InputFrame::builder().axis(Port::Driver, Axis::LeftY, 1.0).build();
        for _ in 0..30 {
            rig.scheduler.run(&ahead);
        }
        assert!((translation(&rig).0 - 1.0).abs() < 1e-12);

        rig.scheduler.run(&back);
        assert!((translation(&rig).0 - 0.96).abs() < 1e-12);

        let mut previous = translation(&rig).0;
        for _ in 0..60 {
            rig.scheduler.run(&back);
            let forward = translation(&rig).0;
            assert!(previous - forward <= 0.04 + 1e-12);
            previous = forward;
        }
        assert!((previous + 1.0).abs() < 1e-12);
    }

    #[test]
    fn restarted_teleop_ramps_from_rest() {
        let mut rig = rig();
        let drive = rig.drivetrain.resource();
        let teleop = slewed_teleop(&rig, 5.0);
        let teleop = rig.scheduler.register(Box::new(teleop)).unwrap();
        let hold = rig
            .scheduler
            .register(Box::new(FunctionalCommand::run("Hold", vec![drive], |_| Ok(()))))
            .unwrap();
        rig.scheduler.set_default_command(drive, teleop).unwrap();

        let ahead = InputFrame::builder().axis(Port::Driver, Axis::LeftY, -1.0).build();
        for _ in 0..5 {
            rig.scheduler.run(&ahead);
        }
        assert!((translation(&rig).0 - 0.5).abs() < 1e-12);

        assert!(rig.scheduler.schedule(hold).is_admitted());
        rig.scheduler.run(&ahead);
        rig.scheduler.cancel(hold);

        rig.scheduler.run(&ahead);
        assert!(rig.scheduler.is_running(teleop));
        assert!((translation(&rig).0 - 0.1).abs() < 1e-12);
    }
}
