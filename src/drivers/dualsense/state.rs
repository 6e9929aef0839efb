use std::{fmt::Display, str::FromStr};

use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};

/// Every digital input on the controller that can take part in a button
/// combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Cross,
    Circle,
    Square,
    Triangle,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    L1,
    R1,
    L2,
    R2,
    L3,
    R3,
    Create,
    Options,
    Ps,
    Touchpad,
    Mute,
}

impl Button {
    pub const ALL: [Button; 19] = [
        Button::Cross,
        Button::Circle,
        Button::Square,
        Button::Triangle,
        Button::DPadUp,
        Button::DPadDown,
        Button::DPadLeft,
        Button::DPadRight,
        Button::L1,
        Button::R1,
        Button::L2,
        Button::R2,
        Button::L3,
        Button::R3,
        Button::Create,
        Button::Options,
        Button::Ps,
        Button::Touchpad,
        Button::Mute,
    ];
}

/// Analog stick position, 128 is centered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stick {
    pub x: u8,
    pub y: u8,
}

impl Default for Stick {
    fn default() -> Self {
        Self { x: 128, y: 128 }
    }
}

/// Decoded d-pad flags. Diagonals set two adjacent flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DPad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DPad {
    /// Decode the 4-bit hat value. 0 is north and values increase clockwise;
    /// anything above 7 is neutral.
    pub fn from_hat(value: u8) -> Self {
        Self {
            up: matches!(value, 7 | 0 | 1),
            right: matches!(value, 1..=3),
            down: matches!(value, 3..=5),
            left: matches!(value, 5..=7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub l2_trigger: u8,
    pub r2_trigger: u8,
    pub dpad: DPad,
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,
    pub l1: bool,
    pub r1: bool,
    pub l2: bool,
    pub r2: bool,
    pub l3: bool,
    pub r3: bool,
    pub create: bool,
    pub options: bool,
    pub ps: bool,
    pub touchpad: bool,
    pub mute: bool,
}

impl InputState {
    pub fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::Cross => self.cross,
            Button::Circle => self.circle,
            Button::Square => self.square,
            Button::Triangle => self.triangle,
            Button::DPadUp => self.dpad.up,
            Button::DPadDown => self.dpad.down,
            Button::DPadLeft => self.dpad.left,
            Button::DPadRight => self.dpad.right,
            Button::L1 => self.l1,
            Button::R1 => self.r1,
            Button::L2 => self.l2,
            Button::R2 => self.r2,
            Button::L3 => self.l3,
            Button::R3 => self.r3,
            Button::Create => self.create,
            Button::Options => self.options,
            Button::Ps => self.ps,
            Button::Touchpad => self.touchpad,
            Button::Mute => self.mute,
        }
    }

    /// Returns all buttons that are currently held
    pub fn pressed(&self) -> Vec<Button> {
        Button::ALL
            .into_iter()
            .filter(|button| self.is_pressed(*button))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector3 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub gyro: Vector3,
    pub accel: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchPoint {
    /// 7-bit contact counter, increments for every new touch
    pub index: u8,
    pub active: bool,
    /// 0-1919
    pub x: u16,
    /// 0-1079
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchpadState {
    pub points: [TouchPoint; 2],
}

/// Charging and fully charged are decoded independently; the controller
/// encodes them in one power-state nibble, but nothing enforces exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryState {
    /// Percentage in [0, 100]
    pub level: f32,
    pub charging: bool,
    pub fully_charged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub headphones: bool,
    pub microphone: bool,
    pub mic_muted: bool,
    pub usb_data: bool,
    pub usb_power: bool,
}

/// Complete decoded state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub input: InputState,
    pub motion: MotionState,
    pub touchpad: TouchpadState,
    pub battery: BatteryState,
    pub connection: ConnectionStatus,
}

#[derive(
    PrimitiveEnum_u8, Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LightbarBehavior {
    #[default]
    PulseDefault = 0x01,
    CustomColor = 0x02,
}

#[derive(
    PrimitiveEnum_u8, Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PlayerLedBrightness {
    #[default]
    High = 0,
    Medium = 1,
    Low = 2,
}

impl FromStr for PlayerLedBrightness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid player LED brightness: {s}")),
        }
    }
}

#[derive(
    PrimitiveEnum_u8, Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MicLed {
    #[default]
    Off = 0,
    On = 1,
    Pulse = 2,
}

impl FromStr for MicLed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "pulse" => Ok(Self::Pulse),
            _ => Err(format!("Invalid mic LED state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Lighting state written to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputState {
    pub lightbar: Rgb,
    pub lightbar_behavior: LightbarBehavior,
    /// Bit 0 is the leftmost of the five player LEDs
    pub player_leds: u8,
    pub player_led_brightness: PlayerLedBrightness,
    pub mic_led: MicLed,
}

/// Mask of the five player indicator LEDs
pub const PLAYER_LED_MASK: u8 = 0x1f;
