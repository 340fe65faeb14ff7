//! Contracts of the robot's physical mechanisms
//!
//! Device drivers live outside this crate. Commands only see these traits,
//! wrapped in a [`Mechanism`] that pairs the shared device with the resource
//! the scheduler arbitrates it by.

pub mod sim;

use crate::error::CommandError;
use crate::mapping::DriveSetpoint;
use crate::resource::ResourceId;
use std::cell::RefCell;
use std::rc::Rc;

pub trait Drivetrain {
    fn drive(&mut self, setpoint: DriveSetpoint) -> Result<(), CommandError>;

    /// Declares the current heading to be zero
    fn zero_gyro(&mut self);

    fn set_motor_brake(&mut self, brake: bool);

    /// Heading in radians, counter-clockwise positive
    fn heading(&self) -> f64;

    /// Points all modules inward so the robot resists being pushed
    fn lock(&mut self) -> Result<(), CommandError>;
}

pub trait Shooter {
    fn set_target_speed(&mut self, speed: f64) -> Result<(), CommandError>;
}

pub trait Arm {
    fn set_speed(&mut self, speed: f64) -> Result<(), CommandError>;
    fn at_upper_limit(&self) -> bool;
    fn at_lower_limit(&self) -> bool;
}

pub trait Intake {
    fn set_speed(&mut self, speed: f64) -> Result<(), CommandError>;
}

/// A shared device together with the resource that guards it.
///
/// Only the command occupying `resource` should mutate the device; access
/// goes through [`Mechanism::with`], which reports a re-entrant borrow as
/// [`CommandError::Busy`] instead of panicking.
pub struct Mechanism<T: ?Sized> {
    name: Rc<str>,
    resource: ResourceId,
    device: Rc<RefCell<T>>,
}

impl<T: ?Sized> Clone for Mechanism<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            resource: self.resource,
            device: self.device.clone(),
        }
    }
}

impl<T: ?Sized> Mechanism<T> {
    pub fn new(name: &str, resource: ResourceId, device: Rc<RefCell<T>>) -> Self {
        Self {
            name: Rc::from(name),
            resource,
            device,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, CommandError> {
        let mut device = self
            .device
            .try_borrow_mut()
            .map_err(|_| CommandError::Busy(self.name.to_string()))?;
        Ok(f(&mut device))
    }

    /// Like [`Mechanism::with`] for fallible device calls
    pub fn try_with<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, CommandError>,
    ) -> Result<R, CommandError> {
        self.with(f)?
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, CommandError> {
        let device = self
            .device
            .try_borrow()
            .map_err(|_| CommandError::Busy(self.name.to_string()))?;
        Ok(f(&device))
    }
}

/// The set of devices a robot is composed from
pub struct Hardware {
    pub drivetrain: Rc<RefCell<dyn Drivetrain>>,
    pub shooter: Rc<RefCell<dyn Shooter>>,
    pub arm: Rc<RefCell<dyn Arm>>,
    pub intake: Rc<RefCell<dyn Intake>>,
    /// Simulated devices select the simulation drive mode by default
    pub simulated: bool,
}
