use crate::controller::frame::{self, InputFrame, InputFrameBuilder, Port};
use crate::controller::InputSource;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Polling,
}

/// Samples connected gamepads into per-cycle frames.
///
/// The first gamepad seen is bound to the driver port, the second to the
/// operator port. A port whose gamepad disconnects reads neutral until a new
/// gamepad connects.
#[machine]
#[derive(Debug)]
pub struct GamepadSource<S: CollectionState> {
    gilrs: Gilrs,
    ports: [Option<GamepadId>; 2],
}

impl<S: CollectionState> GamepadSource<S> {
    pub fn port_of(&self, id: GamepadId) -> Option<Port> {
        Port::ALL
            .into_iter()
            .zip(self.ports)
            .find_map(|(port, bound)| (bound == Some(id)).then_some(port))
    }

    fn bind(&mut self, id: GamepadId) -> Option<Port> {
        if let Some(port) = self.port_of(id) {
            return Some(port);
        }
        let (port, slot) = Port::ALL
            .into_iter()
            .zip(self.ports.iter_mut())
            .find(|(_, slot)| slot.is_none())?;
        *slot = Some(id);
        Some(port)
    }
}

impl GamepadSource<Initializing> {
    pub fn create() -> Result<Self, CollectorError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };
        Ok(Self::new(gilrs, [None, None]))
    }

    /// Binds already connected gamepads to ports and starts polling
    pub fn initialize(mut self) -> GamepadSource<Polling> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, ports read neutral until one appears");
        }
        for (id, name) in gamepads {
            match self.bind(id) {
                Some(port) => info!("Gamepad {} ({}) bound to {:?} port", name, id, port),
                None => debug!("Ignoring extra gamepad {} ({})", name, id),
            }
        }

        info!("Gamepad source initialized, transitioning to Polling state");
        self.transition()
    }
}

impl GamepadSource<Polling> {
    /// Drains pending gilrs events so gamepad state is current, handling
    /// hot-plugging on the way.
    fn pump_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => match self.bind(id) {
                    Some(port) => info!("Gamepad {} connected on {:?} port", id, port),
                    None => debug!("Gamepad {} connected, no free port", id),
                },
                EventType::Disconnected => {
                    if let Some(port) = self.port_of(id) {
                        warn!("Gamepad on {:?} port disconnected", port);
                        for slot in self.ports.iter_mut().filter(|s| **s == Some(id)) {
                            *slot = None;
                        }
                    }
                }
                EventType::ButtonPressed(button, _) => {
                    debug!("Button pressed: {:?} on {}", button, id)
                }
                _ => {}
            }
        }
    }
}

impl InputSource for GamepadSource<Polling> {
    fn poll(&mut self) -> InputFrame {
        self.pump_events();

        let mut builder = InputFrame::builder();
        for (port, bound) in Port::ALL.into_iter().zip(self.ports) {
            let Some(gamepad) = bound.and_then(|id| self.gilrs.connected_gamepad(id)) else {
                continue;
            };
            sample(&mut builder, port, &gamepad);
        }
        builder.build()
    }
}

/// Copies one gamepad's state into the frame. gilrs reports stick Y up
/// positive; frames use the HID convention where back is positive.
fn sample(builder: &mut InputFrameBuilder, port: Port, gamepad: &Gamepad<'_>) {
    builder.set_axis(port, frame::Axis::LeftX, gamepad.value(Axis::LeftStickX) as f64);
    builder.set_axis(port, frame::Axis::LeftY, -gamepad.value(Axis::LeftStickY) as f64);
    builder.set_axis(port, frame::Axis::RightX, gamepad.value(Axis::RightStickX) as f64);
    builder.set_axis(port, frame::Axis::RightY, -gamepad.value(Axis::RightStickY) as f64);

    let trigger = |button| {
        gamepad
            .button_data(button)
            .map(|data| data.value() as f64)
            .unwrap_or(0.0)
    };
    builder.set_axis(port, frame::Axis::LeftTrigger, trigger(Button::LeftTrigger2));
    builder.set_axis(port, frame::Axis::RightTrigger, trigger(Button::RightTrigger2));

    for (raw, button) in BUTTONS {
        builder.set_button(port, button, gamepad.is_pressed(raw));
    }
}

const BUTTONS: [(Button, frame::Button); 10] = [
    (Button::South, frame::Button::A),
    (Button::East, frame::Button::B),
    (Button::West, frame::Button::X),
    (Button::North, frame::Button::Y),
    (Button::LeftTrigger, frame::Button::LeftBumper),
    (Button::RightTrigger, frame::Button::RightBumper),
    (Button::Select, frame::Button::Back),
    (Button::Start, frame::Button::Start),
    (Button::LeftThumb, frame::Button::LeftStick),
    (Button::RightThumb, frame::Button::RightStick),
];
