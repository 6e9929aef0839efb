use super::state::{
    BatteryState, Button, ConnectionStatus, ControllerState, MotionState, Stick, TouchPoint,
};

/// Events that can be emitted by the DualSense controller when a decoded
/// report differs from the previous one
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Button(ButtonEvent),
    Axis(AxisEvent),
    Trigger(TriggerEvent),
    Motion(MotionState),
    Touch(TouchEvent),
    Battery(BatteryState),
    Connection(ConnectionStatus),
}

/// Button events represent binary inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub pressed: bool,
}

/// Axis events are events that have (x, y) values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisEvent {
    LStick(Stick),
    RStick(Stick),
}

/// Trigger events contain positive values indicating how far a trigger is pulled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerEvent {
    L2(u8),
    R2(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchEvent {
    /// Which of the two touch slots changed
    pub slot: u8,
    pub point: TouchPoint,
}

/// Translate the difference between two snapshots into a list of events.
/// Button events are listed first, in [Button::ALL] order.
pub fn translate(old: &ControllerState, new: &ControllerState) -> Vec<Event> {
    let mut events = Vec::new();

    // Button events
    for button in Button::ALL {
        let pressed = new.input.is_pressed(button);
        if pressed != old.input.is_pressed(button) {
            events.push(Event::Button(ButtonEvent { button, pressed }));
        }
    }

    // Axis events
    if new.input.left_stick != old.input.left_stick {
        events.push(Event::Axis(AxisEvent::LStick(new.input.left_stick)));
    }
    if new.input.right_stick != old.input.right_stick {
        events.push(Event::Axis(AxisEvent::RStick(new.input.right_stick)));
    }

    // Trigger events
    if new.input.l2_trigger != old.input.l2_trigger {
        events.push(Event::Trigger(TriggerEvent::L2(new.input.l2_trigger)));
    }
    if new.input.r2_trigger != old.input.r2_trigger {
        events.push(Event::Trigger(TriggerEvent::R2(new.input.r2_trigger)));
    }

    if new.motion != old.motion {
        events.push(Event::Motion(new.motion));
    }

    // Touch events
    for (slot, (point, old_point)) in new
        .touchpad
        .points
        .iter()
        .zip(old.touchpad.points.iter())
        .enumerate()
    {
        if point != old_point {
            events.push(Event::Touch(TouchEvent {
                slot: slot as u8,
                point: *point,
            }));
        }
    }

    if new.battery != old.battery {
        events.push(Event::Battery(new.battery));
    }
    if new.connection != old.connection {
        events.push(Event::Connection(new.connection));
    }

    events
}
