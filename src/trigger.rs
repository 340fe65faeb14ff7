//! Edge-detecting conditions bound to scheduling actions
//!
//! A [`Trigger`] is evaluated once per cycle against the current
//! [`InputFrame`]. Transitions of its value turn into schedule/cancel
//! [`Request`]s that the scheduler applies before running commands.
//!
//! ```text
//! value:      false  true  true  false
//! Rising       -     sched  -     -
//! Falling      -      -     -    sched
//! WhileHigh    -     sched  -    cancel
//! WhileLow     -     cancel -    sched
//! ```

use crate::command::CommandId;
use crate::controller::frame::{Axis, Button, InputFrame, Port};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Schedule once on false → true
    Rising,
    /// Schedule once on true → false
    Falling,
    /// Schedule on false → true, cancel on true → false
    WhileHigh,
    /// Schedule on true → false, cancel on false → true
    WhileLow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Schedule(CommandId),
    Cancel(CommandId),
}

type Condition = Rc<dyn Fn(&InputFrame) -> bool>;

pub struct Trigger {
    name: String,
    condition: Condition,
    previous: bool,
    bindings: Vec<(Edge, CommandId)>,
}

impl Trigger {
    pub fn new<F>(name: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&InputFrame) -> bool + 'static,
    {
        Self {
            name: name.into(),
            condition: Rc::new(condition),
            previous: false,
            bindings: Vec::new(),
        }
    }

    pub fn button(port: Port, button: Button) -> Self {
        Self::new(format!("{:?}.{:?}", port, button), move |frame| {
            frame.button(port, button)
        })
    }

    /// Treats an analog axis as a button, e.g. a trigger pulled past half travel
    pub fn axis_above(port: Port, axis: Axis, threshold: f64) -> Self {
        Self::new(format!("{:?}.{:?}>{}", port, axis, threshold), move |frame| {
            frame.axis(port, axis) > threshold
        })
    }

    /// Both conditions hold. Only the condition of `other` is shared; its
    /// bindings stay with it.
    pub fn and(self, other: &Trigger) -> Self {
        let (left, right) = (self.condition, Rc::clone(&other.condition));
        Self {
            name: format!("({} && {})", self.name, other.name),
            condition: Rc::new(move |frame| left(frame) && right(frame)),
            previous: false,
            bindings: self.bindings,
        }
    }

    /// Either condition holds
    pub fn or(self, other: &Trigger) -> Self {
        let (left, right) = (self.condition, Rc::clone(&other.condition));
        Self {
            name: format!("({} || {})", self.name, other.name),
            condition: Rc::new(move |frame| left(frame) || right(frame)),
            previous: false,
            bindings: self.bindings,
        }
    }

    pub fn negate(self) -> Self {
        let inner = self.condition;
        Self {
            name: format!("!{}", self.name),
            condition: Rc::new(move |frame| !inner(frame)),
            previous: false,
            bindings: self.bindings,
        }
    }

    pub fn on_true(self, command: CommandId) -> Self {
        self.bind(Edge::Rising, command)
    }

    pub fn on_false(self, command: CommandId) -> Self {
        self.bind(Edge::Falling, command)
    }

    pub fn while_true(self, command: CommandId) -> Self {
        self.bind(Edge::WhileHigh, command)
    }

    pub fn while_false(self, command: CommandId) -> Self {
        self.bind(Edge::WhileLow, command)
    }

    pub fn bind(mut self, edge: Edge, command: CommandId) -> Self {
        self.bindings.push((edge, command));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bindings(&self) -> &[(Edge, CommandId)] {
        &self.bindings
    }

    /// Evaluates the condition once and appends the requests its edge produces
    pub fn poll(&mut self, frame: &InputFrame, requests: &mut Vec<Request>) {
        let current = (self.condition)(frame);
        let rising = !self.previous && current;
        let falling = self.previous && !current;
        self.previous = current;

        if !rising && !falling {
            return;
        }
        debug!(
            "Trigger {} {}",
            self.name,
            if rising { "rose" } else { "fell" }
        );

        for &(edge, command) in &self.bindings {
            let request = match (edge, rising) {
                (Edge::Rising, true) => Some(Request::Schedule(command)),
                (Edge::Falling, false) => Some(Request::Schedule(command)),
                (Edge::WhileHigh, true) => Some(Request::Schedule(command)),
                (Edge::WhileHigh, false) => Some(Request::Cancel(command)),
                (Edge::WhileLow, false) => Some(Request::Schedule(command)),
                (Edge::WhileLow, true) => Some(Request::Cancel(command)),
                _ => None,
            };
            if let Some(request) = request {
                requests.push(request);
            }
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("previous", &self.previous)
            .field("bindings", &self.bindings)
            .finish()
    }
}
