//! Teleoperated drive vector mapping
//!
//! Converts the driver's sticks into field-oriented drive inputs:
//!
//! ```text
//! raw axes ──► deadband ──► invert ──► mode ──► DriveInput
//!  (back/right +)                    (forward/left +)
//! ```
//!
//! The mapping itself is stateless. Anything that must persist across cycles
//! (slew limiting, the held heading target) lives in the drive command.

use crate::controller::frame::{Axis, InputFrame, Port};
use crate::mapping::deadband::apply_deadband;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// How the rotation input is interpreted. Fixed once the drivetrain's default
/// command is built; switching means installing a different default command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveMode {
    /// Right stick X commands a yaw rate
    AngularVelocity,
    /// Right stick vector points the robot at an absolute heading
    DirectAngle,
    /// A single axis sweeps the heading target across `[-π, π]`
    AxisAngle { axis: Axis },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deadbands {
    pub left_x: f64,
    pub left_y: f64,
    pub right_x: f64,
    /// Minimum right-stick deflection before a new heading is taken
    pub heading: f64,
}

impl Default for Deadbands {
    fn default() -> Self {
        Self {
            left_x: 0.1,
            left_y: 0.1,
            right_x: 0.1,
            heading: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationInput {
    /// Normalized yaw rate, counter-clockwise positive
    Rate(f64),
    /// Heading target in radians, `None` when the stick is centered and the
    /// previous target should be held
    Heading(Option<f64>),
}

/// Field-oriented drive request for one cycle, forward and left positive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveInput {
    pub forward: f64,
    pub strafe: f64,
    pub rotation: RotationInput,
}

/// What the drivetrain is asked to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveSetpoint {
    Velocity {
        forward: f64,
        strafe: f64,
        rotation: f64,
    },
    Heading {
        forward: f64,
        strafe: f64,
        heading: f64,
    },
}

impl DriveSetpoint {
    pub const STOP: DriveSetpoint = DriveSetpoint::Velocity {
        forward: 0.0,
        strafe: 0.0,
        rotation: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveMapper {
    mode: DriveMode,
    deadbands: Deadbands,
}

impl DriveMapper {
    pub fn new(mode: DriveMode, deadbands: Deadbands) -> Self {
        Self { mode, deadbands }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn map(&self, frame: &InputFrame) -> DriveInput {
        let (forward, strafe) = self.translation(frame);
        let rotation = match self.mode {
            DriveMode::AngularVelocity => RotationInput::Rate(-apply_deadband(
                frame.axis(Port::Driver, Axis::RightX),
                self.deadbands.right_x,
            )),
            DriveMode::DirectAngle => {
                let x = -frame.axis(Port::Driver, Axis::RightX);
                let y = -frame.axis(Port::Driver, Axis::RightY);
                RotationInput::Heading(heading_from_stick(x, y, self.deadbands.heading))
            }
            DriveMode::AxisAngle { axis } => {
                RotationInput::Heading(Some(-frame.axis(Port::Driver, axis) * PI))
            }
        };

        DriveInput {
            forward,
            strafe,
            rotation,
        }
    }

    /// Left stick, deadbanded and flipped to forward/left positive
    fn translation(&self, frame: &InputFrame) -> (f64, f64) {
        let forward = -apply_deadband(
            frame.axis(Port::Driver, Axis::LeftY),
            self.deadbands.left_y,
        );
        let strafe = -apply_deadband(
            frame.axis(Port::Driver, Axis::LeftX),
            self.deadbands.left_x,
        );
        (forward, strafe)
    }
}

/// Angle of the stick vector, zero straight ahead and counter-clockwise
/// positive. Magnitude only gates whether a heading is taken at all.
pub fn heading_from_stick(x: f64, y: f64, min_magnitude: f64) -> Option<f64> {
    if x.hypot(y) < min_magnitude {
        None
    } else {
        Some(x.atan2(y))
    }
}
