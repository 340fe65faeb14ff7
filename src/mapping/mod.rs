//! Conversion of raw stick values into drive requests.
//!
//! The pieces are deliberately small: [`deadband`] removes stick drift,
//! [`slew`] bounds per-cycle change, and [`drive`] combines both sticks into a
//! field-oriented [`DriveInput`] according to the selected [`DriveMode`].

pub mod deadband;
pub mod drive;
pub mod slew;

pub use deadband::apply_deadband;
pub use drive::{Deadbands, DriveInput, DriveMapper, DriveMode, DriveSetpoint, RotationInput};
pub use slew::{PlanarSlewLimiter, SlewRateLimiter};
