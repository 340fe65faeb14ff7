//! In-memory mechanisms for running without hardware
//!
//! Each device integrates its state a little on every call, which is enough
//! for limits to trip and headings to move in the cycle loop and in tests.

use crate::error::CommandError;
use crate::mapping::DriveSetpoint;
use crate::subsystem::{Arm, Drivetrain, Hardware, Intake, Shooter};
use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use tracing::{debug, info, trace};

/// Wraps an angle into `(-π, π]`
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[derive(Debug)]
pub struct SimDrivetrain {
    heading: f64,
    /// Radians per second at full rotation input
    max_angular_rate: f64,
    period_secs: f64,
    brake: bool,
    locked: bool,
    last: DriveSetpoint,
    fault: Option<String>,
}

impl SimDrivetrain {
    pub fn new(period_secs: f64) -> Self {
        Self {
            heading: 0.0,
            max_angular_rate: 2.0 * PI,
            period_secs,
            brake: true,
            locked: false,
            last: DriveSetpoint::STOP,
            fault: None,
        }
    }

    pub fn last_setpoint(&self) -> DriveSetpoint {
        self.last
    }

    pub fn brake(&self) -> bool {
        self.brake
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_heading(&mut self, heading: f64) {
        self.heading = wrap_angle(heading);
    }

    /// Makes every following `drive` call fail until cleared
    pub fn inject_fault(&mut self, fault: Option<String>) {
        self.fault = fault;
    }
}

impl Default for SimDrivetrain {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl Drivetrain for SimDrivetrain {
    fn drive(&mut self, setpoint: DriveSetpoint) -> Result<(), CommandError> {
        if let Some(fault) = &self.fault {
            return Err(CommandError::Subsystem(fault.clone()));
        }
        match setpoint {
            DriveSetpoint::Velocity { rotation, .. } => {
                self.heading =
                    wrap_angle(self.heading + rotation * self.max_angular_rate * self.period_secs);
            }
            DriveSetpoint::Heading { heading, .. } => {
                self.heading = wrap_angle(heading);
            }
        }
        trace!("Sim drivetrain {:?}, heading {:.3}", setpoint, self.heading);
        self.locked = false;
        self.last = setpoint;
        Ok(())
    }

    fn zero_gyro(&mut self) {
        info!("Gyro zeroed at {:.3} rad", self.heading);
        self.heading = 0.0;
    }

    fn set_motor_brake(&mut self, brake: bool) {
        debug!("Drive motors {}", if brake { "braking" } else { "coasting" });
        self.brake = brake;
    }

    fn heading(&self) -> f64 {
        self.heading
    }

    fn lock(&mut self) -> Result<(), CommandError> {
        self.locked = true;
        self.last = DriveSetpoint::STOP;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SimShooter {
    target_speed: f64,
}

impl SimShooter {
    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }
}

impl Shooter for SimShooter {
    fn set_target_speed(&mut self, speed: f64) -> Result<(), CommandError> {
        if speed != self.target_speed {
            debug!("Shooter target {} -> {}", self.target_speed, speed);
        }
        self.target_speed = speed;
        Ok(())
    }
}

/// Arm travelling between 0 (lower limit) and 1 (upper limit)
#[derive(Debug)]
pub struct SimArm {
    position: f64,
    speed: f64,
    /// Travel per call at full speed
    step: f64,
}

impl SimArm {
    pub fn new(position: f64, step: f64) -> Self {
        Self {
            position: position.clamp(0.0, 1.0),
            speed: 0.0,
            step,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new(0.5, 0.05)
    }
}

impl Arm for SimArm {
    fn set_speed(&mut self, speed: f64) -> Result<(), CommandError> {
        self.speed = speed;
        self.position = (self.position + speed * self.step).clamp(0.0, 1.0);
        trace!("Sim arm at {:.3}", self.position);
        Ok(())
    }

    fn at_upper_limit(&self) -> bool {
        self.position >= 1.0
    }

    fn at_lower_limit(&self) -> bool {
        self.position <= 0.0
    }
}

#[derive(Debug, Default)]
pub struct SimIntake {
    speed: f64,
}

impl SimIntake {
    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Intake for SimIntake {
    fn set_speed(&mut self, speed: f64) -> Result<(), CommandError> {
        self.speed = speed;
        Ok(())
    }
}

/// Concrete handles to a full simulated robot, kept so the state can be
/// inspected after handing [`Hardware`] to the container.
#[derive(Clone)]
pub struct SimRobot {
    pub drivetrain: Rc<RefCell<SimDrivetrain>>,
    pub shooter: Rc<RefCell<SimShooter>>,
    pub arm: Rc<RefCell<SimArm>>,
    pub intake: Rc<RefCell<SimIntake>>,
}

impl SimRobot {
    pub fn new(period_secs: f64) -> Self {
        Self {
            drivetrain: Rc::new(RefCell::new(SimDrivetrain::new(period_secs))),
            shooter: Rc::new(RefCell::new(SimShooter::default())),
            arm: Rc::new(RefCell::new(SimArm::default())),
            intake: Rc::new(RefCell::new(SimIntake::default())),
        }
    }

    pub fn hardware(&self) -> Hardware {
        Hardware {
            drivetrain: self.drivetrain.clone(),
            shooter: self.shooter.clone(),
            arm: self.arm.clone(),
            intake: self.intake.clone(),
            simulated: true,
        }
    }
}
