//! Translation between raw DualSense reports and [ControllerState] /
//! [OutputState]. Nothing in here performs I/O.
use packed_struct::{prelude::*, PackingError};
use thiserror::Error;

use crate::transport::TransportKind;

use super::{
    checksum,
    hid_report::{
        BluetoothPackedOutputReport, PackedInputState, SetStatePackedOutputData,
        TouchFingerData, UsbPackedOutputReport,
    },
    state::{
        BatteryState, ConnectionStatus, ControllerState, DPad, InputState, MotionState,
        OutputState, Stick, TouchPoint, TouchpadState, Vector3, PLAYER_LED_MASK,
    },
    DS5_BATTERY_RAW_MAX, INPUT_REPORT_BT, INPUT_REPORT_BT_MIN_SIZE, INPUT_REPORT_BT_SIMPLE,
    INPUT_REPORT_USB, INPUT_STATE_SIZE,
};

/// Power state nibble values
const POWER_STATE_CHARGING: u8 = 0x01;
const POWER_STATE_COMPLETE: u8 = 0x02;

/// Reasons an input report is not applied to the controller state
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("Report too short: {0} bytes")]
    TooShort(usize),
    #[error("Unknown report id: {0:#04x}")]
    UnknownReportId(u8),
    #[error("Controller is sending simple Bluetooth reports")]
    SimpleMode,
    #[error("Unable to unpack report")]
    Malformed,
}

/// Decode the given input report read from a device on the given transport.
/// Rejected reports never produce partial state.
pub fn decode(buf: &[u8], transport: TransportKind) -> Result<ControllerState, RejectReason> {
    let payload = match transport {
        TransportKind::Usb => {
            let Some(report_id) = buf.first() else {
                return Err(RejectReason::TooShort(0));
            };
            if *report_id != INPUT_REPORT_USB {
                return Err(RejectReason::UnknownReportId(*report_id));
            }
            &buf[1..]
        }
        TransportKind::Bluetooth => {
            if buf.len() < INPUT_REPORT_BT_MIN_SIZE {
                return Err(RejectReason::TooShort(buf.len()));
            }
            match buf[0] {
                INPUT_REPORT_BT => &buf[2..],
                INPUT_REPORT_BT_SIMPLE => return Err(RejectReason::SimpleMode),
                report_id => return Err(RejectReason::UnknownReportId(report_id)),
            }
        }
    };

    if payload.len() < INPUT_STATE_SIZE {
        return Err(RejectReason::TooShort(buf.len()));
    }
    let bytes: &[u8; INPUT_STATE_SIZE] = payload[..INPUT_STATE_SIZE]
        .try_into()
        .map_err(|_| RejectReason::TooShort(buf.len()))?;
    let packed = PackedInputState::unpack(bytes).map_err(|e| {
        log::trace!("Unable to unpack input report: {e:?}");
        RejectReason::Malformed
    })?;

    Ok(ControllerState::from(&packed))
}

/// Encode the given output state into a complete output report for the given
/// transport. Bluetooth reports carry the CRC-32 trailer.
pub fn encode(state: &OutputState, transport: TransportKind) -> Result<Vec<u8>, PackingError> {
    let data = SetStatePackedOutputData::from(state);
    match transport {
        TransportKind::Usb => {
            let report = UsbPackedOutputReport {
                state: data,
                ..Default::default()
            };
            Ok(report.pack()?.to_vec())
        }
        TransportKind::Bluetooth => {
            let report = BluetoothPackedOutputReport {
                state: data,
                ..Default::default()
            };
            let mut buf = report.pack()?.to_vec();
            checksum::append(&mut buf);
            Ok(buf)
        }
    }
}

/// Battery level from the raw 0-8 nibble
pub fn battery_level(raw: u8) -> f32 {
    let level = (raw as u32 * 100 / DS5_BATTERY_RAW_MAX as u32).min(100);
    level as f32
}

impl From<&TouchFingerData> for TouchPoint {
    fn from(finger: &TouchFingerData) -> Self {
        Self {
            index: finger.index.to_primitive(),
            active: finger.is_touching(),
            x: finger.get_x(),
            y: finger.get_y(),
        }
    }
}

impl From<&PackedInputState> for ControllerState {
    fn from(report: &PackedInputState) -> Self {
        let input = InputState {
            left_stick: Stick {
                x: report.joystick_l_x,
                y: report.joystick_l_y,
            },
            right_stick: Stick {
                x: report.joystick_r_x,
                y: report.joystick_r_y,
            },
            l2_trigger: report.l2_trigger,
            r2_trigger: report.r2_trigger,
            dpad: DPad::from_hat(report.dpad.to_primitive()),
            cross: report.cross,
            circle: report.circle,
            square: report.square,
            triangle: report.triangle,
            l1: report.l1,
            r1: report.r1,
            l2: report.l2,
            r2: report.r2,
            l3: report.l3,
            r3: report.r3,
            create: report.create,
            options: report.options,
            ps: report.ps,
            touchpad: report.touchpad,
            mute: report.mute,
        };

        let motion = MotionState {
            gyro: Vector3 {
                x: report.gyro_x.to_primitive(),
                y: report.gyro_y.to_primitive(),
                z: report.gyro_z.to_primitive(),
            },
            accel: Vector3 {
                x: report.accel_x.to_primitive(),
                y: report.accel_y.to_primitive(),
                z: report.accel_z.to_primitive(),
            },
        };

        let fingers = &report.touch_data.touch_finger_data;
        let touchpad = TouchpadState {
            points: [TouchPoint::from(&fingers[0]), TouchPoint::from(&fingers[1])],
        };

        let power_state = report.power_state.to_primitive();
        let battery = BatteryState {
            level: battery_level(report.power_percent.to_primitive()),
            charging: power_state == POWER_STATE_CHARGING,
            fully_charged: power_state == POWER_STATE_COMPLETE,
        };

        let connection = ConnectionStatus {
            headphones: report.plugged_headphones,
            microphone: report.plugged_mic,
            mic_muted: report.mic_muted,
            usb_data: report.plugged_usb_data,
            usb_power: report.plugged_usb_power,
        };

        Self {
            input,
            motion,
            touchpad,
            battery,
            connection,
        }
    }
}

impl From<&OutputState> for SetStatePackedOutputData {
    fn from(state: &OutputState) -> Self {
        Self {
            allow_player_indicators: true,
            allow_led_color: true,
            allow_mute_light: true,
            mute_light_mode: state.mic_led,
            allow_color_light_fade_animation: true,
            allow_light_brightness_change: true,
            lightbar_behavior: state.lightbar_behavior,
            player_light_brightness: state.player_led_brightness,
            player_light_instant: true,
            player_lights: Integer::from_primitive(state.player_leds & PLAYER_LED_MASK),
            led_red: state.lightbar.r,
            led_green: state.lightbar.g,
            led_blue: state.lightbar.b,
            ..Default::default()
        }
    }
}
