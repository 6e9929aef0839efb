use std::{collections::HashMap, fmt::Display, sync::Arc};

use thiserror::Error;

use crate::{drivers::dualsense::state::PLAYER_LED_MASK, session::SessionError};

use super::{ActionKind, ActionTarget, BatteryIndicatorStyle, SpecialAction};

/// Battery thresholds (percent) and the cumulative player LED masks lit once
/// each is reached
const BATTERY_LED_STEPS: [(f32, u8); 5] = [
    (100.0, 0b11111),
    (75.0, 0b01111),
    (50.0, 0b00111),
    (25.0, 0b00011),
    (12.5, 0b00001),
];

/// Possible errors while running a special action
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("No handler registered for {0}")]
    UnknownHandler(HandlerKey),
}

/// Key used to look up the handler for an action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    BatteryLightbar,
    BatteryPlayerLeds,
    DisconnectController,
    Custom(String),
}

impl Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKey::BatteryLightbar => write!(f, "battery_indicator/lightbar"),
            HandlerKey::BatteryPlayerLeds => write!(f, "battery_indicator/player_leds"),
            HandlerKey::DisconnectController => write!(f, "disconnect_controller"),
            HandlerKey::Custom(name) => write!(f, "custom/{name}"),
        }
    }
}

impl From<&ActionKind> for HandlerKey {
    fn from(kind: &ActionKind) -> Self {
        match kind {
            ActionKind::BatteryIndicator { style } => match style {
                BatteryIndicatorStyle::Lightbar => HandlerKey::BatteryLightbar,
                BatteryIndicatorStyle::PlayerLeds => HandlerKey::BatteryPlayerLeds,
            },
            ActionKind::DisconnectController => HandlerKey::DisconnectController,
            ActionKind::Custom { handler } => HandlerKey::Custom(handler.clone()),
        }
    }
}

pub type Handler =
    Arc<dyn Fn(&dyn ActionTarget, &SpecialAction) -> Result<(), ActionError> + Send + Sync>;

/// Dispatch table from action kind to the code that runs it
#[derive(Clone)]
pub struct HandlerTable {
    handlers: HashMap<HandlerKey, Handler>,
}

impl Default for HandlerTable {
    /// Table with the built-in battery indicator and disconnect handlers
    fn default() -> Self {
        let mut table = Self::empty();
        table.register(HandlerKey::BatteryLightbar, Arc::new(battery_lightbar));
        table.register(HandlerKey::BatteryPlayerLeds, Arc::new(battery_player_leds));
        table.register(
            HandlerKey::DisconnectController,
            Arc::new(disconnect_controller),
        );
        table
    }
}

impl HandlerTable {
    /// Table without any handlers
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any existing handler for the key
    pub fn register(&mut self, key: HandlerKey, handler: Handler) {
        self.handlers.insert(key, handler);
    }

    /// Register a custom handler under the given name
    pub fn register_custom(&mut self, name: &str, handler: Handler) {
        self.register(HandlerKey::Custom(name.to_string()), handler);
    }

    /// Run the handler for the given action
    pub fn dispatch(
        &self,
        target: &dyn ActionTarget,
        action: &SpecialAction,
    ) -> Result<(), ActionError> {
        let key = HandlerKey::from(&action.action);
        let Some(handler) = self.handlers.get(&key) else {
            return Err(ActionError::UnknownHandler(key));
        };
        handler(target, action)
    }
}

/// Linear interpolation from red at 0% to green at 100%
pub fn battery_color(level: f32) -> (u8, u8, u8) {
    let t = (level / 100.0).clamp(0.0, 1.0);
    let r = ((1.0 - t) * 255.0).round() as u8;
    let g = (t * 255.0).round() as u8;
    (r, g, 0)
}

/// Cumulative player LED mask for the given battery level
pub fn battery_led_mask(level: f32) -> u8 {
    BATTERY_LED_STEPS
        .iter()
        .find(|(threshold, _)| level >= *threshold)
        .map(|(_, mask)| *mask & PLAYER_LED_MASK)
        .unwrap_or_default()
}

fn battery_lightbar(target: &dyn ActionTarget, _action: &SpecialAction) -> Result<(), ActionError> {
    let level = target.battery().level;
    let (r, g, b) = battery_color(level);
    log::debug!("Showing battery level {level}% on lightbar");
    target.set_lightbar(r, g, b)?;
    Ok(())
}

fn battery_player_leds(
    target: &dyn ActionTarget,
    _action: &SpecialAction,
) -> Result<(), ActionError> {
    let level = target.battery().level;
    let brightness = target.output_state().player_led_brightness;
    log::debug!("Showing battery level {level}% on player LEDs");
    target.set_player_leds(battery_led_mask(level), brightness)?;
    Ok(())
}

fn disconnect_controller(
    target: &dyn ActionTarget,
    _action: &SpecialAction,
) -> Result<(), ActionError> {
    if !target.disconnect_bluetooth() {
        log::info!(
            "Controller {} cannot be disconnected over Bluetooth",
            target.device_id()
        );
    }
    Ok(())
}
