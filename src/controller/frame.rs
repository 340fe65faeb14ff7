use serde::{Deserialize, Serialize};
use tracing::trace;

/// Analog axes of one gamepad, in the HID convention (back and right positive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    LeftTrigger,
    RightTrigger,
}

impl Axis {
    pub const ALL: [Axis; 6] = [
        Axis::LeftX,
        Axis::LeftY,
        Axis::RightX,
        Axis::RightY,
        Axis::LeftTrigger,
        Axis::RightTrigger,
    ];

    fn index(self) -> usize {
        match self {
            Axis::LeftX => 0,
            Axis::LeftY => 1,
            Axis::RightX => 2,
            Axis::RightY => 3,
            Axis::LeftTrigger => 4,
            Axis::RightTrigger => 5,
        }
    }

    /// Maps a raw Xbox axis number to the named axis
    pub fn from_raw(raw: usize) -> Option<Axis> {
        match raw {
            0 => Some(Axis::LeftX),
            1 => Some(Axis::LeftY),
            2 => Some(Axis::LeftTrigger),
            3 => Some(Axis::RightTrigger),
            4 => Some(Axis::RightX),
            5 => Some(Axis::RightY),
            _ => None,
        }
    }
}

/// Digital buttons of one gamepad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    LeftStick,
    RightStick,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::Back,
        Button::Start,
        Button::LeftStick,
        Button::RightStick,
    ];

    fn mask(self) -> u16 {
        1 << (self as u16)
    }

    /// Maps a raw one-based Xbox button number (1 = A, 2 = B, 3 = X, 4 = Y, ...)
    pub fn from_raw(raw: usize) -> Option<Button> {
        raw.checked_sub(1).and_then(|idx| Button::ALL.get(idx).copied())
    }
}

/// Controller slot on the driver station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    Driver,
    Operator,
}

impl Port {
    pub const ALL: [Port; 2] = [Port::Driver, Port::Operator];

    fn index(self) -> usize {
        match self {
            Port::Driver => 0,
            Port::Operator => 1,
        }
    }
}

/// Axis and button state of one gamepad for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    axes: [f64; 6],
    buttons: u16,
}

impl ControllerState {
    pub fn axis(&self, axis: Axis) -> f64 {
        self.axes[axis.index()]
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons & button.mask() != 0
    }
}

/// Snapshot of all human-interface inputs for one control cycle.
///
/// Built once per cycle and never mutated afterwards. Axis values are clamped
/// to `[-1, 1]` on construction since HID hardware glitches transiently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    controllers: [ControllerState; 2],
}

impl InputFrame {
    /// All sticks centered, nothing pressed
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn builder() -> InputFrameBuilder {
        InputFrameBuilder::default()
    }

    pub fn controller(&self, port: Port) -> &ControllerState {
        &self.controllers[port.index()]
    }

    pub fn axis(&self, port: Port, axis: Axis) -> f64 {
        self.controller(port).axis(axis)
    }

    pub fn button(&self, port: Port, button: Button) -> bool {
        self.controller(port).button(button)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputFrameBuilder {
    frame: InputFrame,
}

impl InputFrameBuilder {
    pub fn axis(mut self, port: Port, axis: Axis, value: f64) -> Self {
        self.set_axis(port, axis, value);
        self
    }

    pub fn button(mut self, port: Port, button: Button, pressed: bool) -> Self {
        self.set_button(port, button, pressed);
        self
    }

    pub fn set_axis(&mut self, port: Port, axis: Axis, value: f64) {
        self.frame.controllers[port.index()].axes[axis.index()] = sanitize_axis(value);
    }

    pub fn set_button(&mut self, port: Port, button: Button, pressed: bool) {
        let state = &mut self.frame.controllers[port.index()];
        if pressed {
            state.buttons |= button.mask();
        } else {
            state.buttons &= !button.mask();
        }
    }

    pub fn build(self) -> InputFrame {
        self.frame
    }
}

/// Out-of-range values are clamped, NaN reads as centered
fn sanitize_axis(value: f64) -> f64 {
    if value.is_nan() {
        trace!("Axis reported NaN, treating as 0");
        return 0.0;
    }
    let clamped = value.clamp(-1.0, 1.0);
    if clamped != value {
        trace!("Axis value {} clamped to {}", value, clamped);
    }
    clamped
}
