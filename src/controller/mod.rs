//! Human-interface input
//!
//! Once per control cycle an [`InputSource`] produces an immutable
//! [`frame::InputFrame`] covering both controller ports. Everything
//! downstream (triggers, drive mapping, commands) reads only that frame.
//!
//! ```text
//! Gamepads ──► GamepadSource ──► InputFrame ──► Scheduler::run
//!              (gilrs polling)   (clamped)
//! ```

pub mod event_collector;
pub mod frame;

use frame::InputFrame;

/// Anything that can be sampled once per cycle
pub trait InputSource {
    fn poll(&mut self) -> InputFrame;
}

/// Reports centered sticks and released buttons forever. Used when no
/// gamepad backend is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralSource;

impl InputSource for NeutralSource {
    fn poll(&mut self) -> InputFrame {
        InputFrame::neutral()
    }
}
