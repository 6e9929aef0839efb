use std::error::Error;

use crate::drivers::dualsense::{
    event::{translate, AxisEvent, ButtonEvent, Event, TouchEvent},
    state::{Button, ControllerState, Stick},
};

#[test]
fn test_translate_no_change() -> Result<(), Box<dyn Error>> {
    let state = ControllerState::default();
    assert!(translate(&state, &state).is_empty());
    Ok(())
}

#[test]
fn test_translate_buttons_and_axes() -> Result<(), Box<dyn Error>> {
    let old = ControllerState::default();
    let mut new = old;
    new.input.cross = true;
    new.input.dpad.up = true;
    new.input.dpad.right = true;
    new.input.left_stick = Stick { x: 10, y: 250 };
    new.touchpad.points[1].active = true;

    let events = translate(&old, &new);
    assert_eq!(
        events,
        vec![
            Event::Button(ButtonEvent {
                button: Button::Cross,
                pressed: true
            }),
            Event::Button(ButtonEvent {
                button: Button::DPadUp,
                pressed: true
            }),
            Event::Button(ButtonEvent {
                button: Button::DPadRight,
                pressed: true
            }),
            Event::Axis(AxisEvent::LStick(Stick { x: 10, y: 250 })),
            Event::Touch(TouchEvent {
                slot: 1,
                point: new.touchpad.points[1],
            }),
        ]
    );

    // Releasing produces the inverse button events
    let events = translate(&new, &old);
    assert!(events.contains(&Event::Button(ButtonEvent {
        button: Button::Cross,
        pressed: false
    })));
    Ok(())
}

#[test]
fn test_translate_battery() -> Result<(), Box<dyn Error>> {
    let old = ControllerState::default();
    let mut new = old;
    new.battery.level = 50.0;
    new.battery.charging = true;
    let events = translate(&old, &new);
    assert_eq!(events, vec![Event::Battery(new.battery)]);
    Ok(())
}
