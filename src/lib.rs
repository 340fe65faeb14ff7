//! Cooperative command scheduling for a teleoperated competition robot.
//!
//! Mechanisms are [`resource`]s. Behaviour is expressed as [`command`]s that
//! claim resources; the [`scheduler`] arbitrates between them once per
//! control cycle, driven by [`trigger`] bindings over the controller
//! [`InputFrame`](controller::frame::InputFrame). [`container::compose`]
//! assembles the whole robot from a [`config::RobotConfig`].

pub mod command;
pub mod config;
pub mod container;
pub mod controller;
pub mod error;
pub mod mapping;
pub mod resource;
pub mod scheduler;
pub mod subsystem;
pub mod trigger;
