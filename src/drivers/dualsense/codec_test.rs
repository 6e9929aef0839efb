use std::error::Error;

use crate::{
    drivers::dualsense::{
        checksum,
        codec::{battery_level, decode, encode, RejectReason},
        state::{LightbarBehavior, MicLed, OutputState, PlayerLedBrightness, Rgb},
        INPUT_REPORT_BT_SIZE, INPUT_REPORT_USB_SIZE, OUTPUT_REPORT_BT_SIZE,
        OUTPUT_REPORT_USB_SIZE,
    },
    transport::TransportKind,
};

/// Build a USB input report with the given state bytes. Offsets are relative
/// to the start of the shared state block.
fn usb_report(state: &[(usize, u8)]) -> Vec<u8> {
    let mut buf = vec![0u8; INPUT_REPORT_USB_SIZE];
    buf[0] = 0x01;
    // Centered sticks, neutral d-pad and no touch contacts
    buf[1..=4].copy_from_slice(&[0x80; 4]);
    buf[1 + 7] = 0x08;
    buf[1 + 32] = 0x80;
    buf[1 + 36] = 0x80;
    for (offset, value) in state {
        buf[1 + offset] = *value;
    }
    buf
}

fn bt_report(state: &[(usize, u8)]) -> Vec<u8> {
    let usb = usb_report(state);
    let mut buf = vec![0u8; INPUT_REPORT_BT_SIZE];
    buf[0] = 0x31;
    buf[1] = 0x42;
    buf[2..65].copy_from_slice(&usb[1..64]);
    buf
}

#[test]
fn test_decode_neutral() -> Result<(), Box<dyn Error>> {
    let state = decode(&usb_report(&[]), TransportKind::Usb)?;
    assert_eq!(state.input.left_stick.x, 128);
    assert_eq!(state.input.right_stick.y, 128);
    assert!(state.input.pressed().is_empty());
    assert!(!state.touchpad.points[0].active);
    assert!(!state.touchpad.points[1].active);
    Ok(())
}

#[test]
fn test_decode_dpad() -> Result<(), Box<dyn Error>> {
    let state = decode(&usb_report(&[(7, 0x00)]), TransportKind::Usb)?;
    assert!(state.input.dpad.up);
    assert!(!state.input.dpad.right && !state.input.dpad.down && !state.input.dpad.left);

    let state = decode(&usb_report(&[(7, 0x01)]), TransportKind::Usb)?;
    assert!(state.input.dpad.up && state.input.dpad.right);
    assert!(!state.input.dpad.down && !state.input.dpad.left);

    let state = decode(&usb_report(&[(7, 0x06)]), TransportKind::Usb)?;
    assert!(state.input.dpad.left);
    assert!(!state.input.dpad.up && !state.input.dpad.down && !state.input.dpad.right);

    // Values above 7 are neutral
    let state = decode(&usb_report(&[(7, 0x0f)]), TransportKind::Usb)?;
    assert_eq!(state.input.dpad, Default::default());
    Ok(())
}

#[test]
fn test_decode_buttons() -> Result<(), Box<dyn Error>> {
    // Cross and square with d-pad neutral, L1 and options, PS and mute
    let state = decode(
        &usb_report(&[(7, 0x38), (8, 0x21), (9, 0x05)]),
        TransportKind::Usb,
    )?;
    let input = state.input;
    assert!(input.cross && input.square);
    assert!(!input.circle && !input.triangle);
    assert!(input.l1 && input.options);
    assert!(!input.r1 && !input.create);
    assert!(input.ps && input.mute);
    assert!(!input.touchpad);
    Ok(())
}

#[test]
fn test_decode_motion() -> Result<(), Box<dyn Error>> {
    // Gyro is sent as x, z, y; accel as x, y, z
    let state = decode(
        &usb_report(&[
            (15, 0x01),
            (16, 0x00),
            (17, 0x02),
            (18, 0x00),
            (19, 0xff),
            (20, 0xff),
            (21, 0x10),
            (22, 0x00),
            (23, 0x00),
            (24, 0x80),
            (25, 0x00),
            (26, 0x01),
        ]),
        TransportKind::Usb,
    )?;
    assert_eq!(state.motion.gyro.x, 1);
    assert_eq!(state.motion.gyro.z, 2);
    assert_eq!(state.motion.gyro.y, -1);
    assert_eq!(state.motion.accel.x, 16);
    assert_eq!(state.motion.accel.y, i16::MIN);
    assert_eq!(state.motion.accel.z, 256);
    Ok(())
}

#[test]
fn test_decode_touch() -> Result<(), Box<dyn Error>> {
    let state = decode(
        &usb_report(&[(32, 0x05), (33, 0x64), (34, 0x80), (35, 0x0c)]),
        TransportKind::Usb,
    )?;
    let point = state.touchpad.points[0];
    assert!(point.active);
    assert_eq!(point.index, 5);
    assert_eq!(point.x, 100);
    assert_eq!(point.y, 200);

    // Second contact is not touching
    let state = decode(
        &usb_report(&[(36, 0x85), (37, 0x7f), (38, 0xc7), (39, 0x42)]),
        TransportKind::Usb,
    )?;
    let point = state.touchpad.points[1];
    assert!(!point.active);
    assert_eq!(point.x, 1919);
    assert_eq!(point.y, 1068);
    Ok(())
}

#[test]
fn test_decode_battery() -> Result<(), Box<dyn Error>> {
    let state = decode(&usb_report(&[(52, 0x08)]), TransportKind::Usb)?;
    assert_eq!(state.battery.level, 100.0);
    assert!(!state.battery.charging);
    assert!(!state.battery.fully_charged);

    let state = decode(&usb_report(&[(52, 0x11)]), TransportKind::Usb)?;
    assert_eq!(state.battery.level, 12.0);
    assert!(state.battery.charging);

    let state = decode(&usb_report(&[(52, 0x2a)]), TransportKind::Usb)?;
    assert_eq!(state.battery.level, 100.0);
    assert!(state.battery.fully_charged);
    assert!(!state.battery.charging);

    assert_eq!(battery_level(0), 0.0);
    assert_eq!(battery_level(4), 50.0);
    assert_eq!(battery_level(15), 100.0);
    Ok(())
}

#[test]
fn test_decode_connection() -> Result<(), Box<dyn Error>> {
    let state = decode(&usb_report(&[(53, 0x1b)]), TransportKind::Usb)?;
    let connection = state.connection;
    assert!(connection.headphones);
    assert!(connection.microphone);
    assert!(!connection.mic_muted);
    assert!(connection.usb_data);
    assert!(connection.usb_power);
    Ok(())
}

#[test]
fn test_decode_bluetooth() -> Result<(), Box<dyn Error>> {
    let state = decode(
        &bt_report(&[(0, 0x00), (5, 0xff), (7, 0x48)]),
        TransportKind::Bluetooth,
    )?;
    assert_eq!(state.input.left_stick.x, 0);
    assert_eq!(state.input.r2_trigger, 255);
    assert!(state.input.circle);
    assert_eq!(state.input.dpad, Default::default());
    Ok(())
}

#[test]
fn test_decode_rejects() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(&[], TransportKind::Usb),
        Err(RejectReason::TooShort(0))
    );
    assert_eq!(
        decode(&[0x01; 20], TransportKind::Usb),
        Err(RejectReason::TooShort(20))
    );
    let mut report = usb_report(&[]);
    report[0] = 0x05;
    assert_eq!(
        decode(&report, TransportKind::Usb),
        Err(RejectReason::UnknownReportId(0x05))
    );

    assert_eq!(
        decode(&[0x31; 9], TransportKind::Bluetooth),
        Err(RejectReason::TooShort(9))
    );
    let mut simple = vec![0u8; 10];
    simple[0] = 0x01;
    assert_eq!(
        decode(&simple, TransportKind::Bluetooth),
        Err(RejectReason::SimpleMode)
    );
    let mut report = bt_report(&[]);
    report[0] = 0x11;
    assert_eq!(
        decode(&report, TransportKind::Bluetooth),
        Err(RejectReason::UnknownReportId(0x11))
    );
    assert_eq!(
        decode(&bt_report(&[])[..40], TransportKind::Bluetooth),
        Err(RejectReason::TooShort(40))
    );
    Ok(())
}

#[test]
fn test_encode_usb() -> Result<(), Box<dyn Error>> {
    let state = OutputState {
        lightbar: Rgb::new(0x11, 0x22, 0x33),
        lightbar_behavior: LightbarBehavior::CustomColor,
        player_leds: 0b10101,
        player_led_brightness: PlayerLedBrightness::Low,
        mic_led: MicLed::Pulse,
    };
    let report = encode(&state, TransportKind::Usb)?;
    assert_eq!(report.len(), OUTPUT_REPORT_USB_SIZE);
    assert_eq!(report[0], 0x02);
    assert_eq!(report[1], 0x00);
    assert_eq!(report[2], 0x15);
    assert_eq!(report[9], 0x02);
    assert_eq!(report[39], 0x03);
    assert_eq!(report[42], 0x02);
    assert_eq!(report[43], 0x02);
    assert_eq!(report[44], 0x20 | 0b10101);
    assert_eq!(report[45..=47], [0x11, 0x22, 0x33]);
    Ok(())
}

#[test]
fn test_encode_masks_player_leds() -> Result<(), Box<dyn Error>> {
    let state = OutputState {
        player_leds: 0xff,
        ..Default::default()
    };
    let report = encode(&state, TransportKind::Usb)?;
    assert_eq!(report[44], 0x20 | 0x1f);
    Ok(())
}

#[test]
fn test_encode_bluetooth() -> Result<(), Box<dyn Error>> {
    let state = OutputState {
        lightbar: Rgb::new(255, 0, 0),
        lightbar_behavior: LightbarBehavior::CustomColor,
        player_leds: 0,
        player_led_brightness: PlayerLedBrightness::High,
        mic_led: MicLed::Off,
    };
    let report = encode(&state, TransportKind::Bluetooth)?;
    assert_eq!(report.len(), OUTPUT_REPORT_BT_SIZE);
    assert_eq!(report[0], 0x31);
    assert_eq!(report[1], 0x02);
    assert_eq!(report[3], 0x15);
    assert_eq!(report[43], 0x02);
    assert_eq!(report[46..=48], [255, 0, 0]);
    assert_eq!(report[74..], [0x5e, 0x46, 0x42, 0x08]);
    assert!(checksum::verify(&report));

    let state = OutputState {
        lightbar: Rgb::new(0, 0, 255),
        lightbar_behavior: LightbarBehavior::PulseDefault,
        player_leds: 0b00100,
        player_led_brightness: PlayerLedBrightness::Medium,
        mic_led: MicLed::On,
    };
    let report = encode(&state, TransportKind::Bluetooth)?;
    assert_eq!(report[74..], [0x1d, 0x61, 0xe4, 0x52]);
    Ok(())
}

#[test]
fn test_encode_is_deterministic() -> Result<(), Box<dyn Error>> {
    let state = OutputState {
        lightbar: Rgb::new(1, 2, 3),
        ..Default::default()
    };
    assert_eq!(
        encode(&state, TransportKind::Bluetooth)?,
        encode(&state, TransportKind::Bluetooth)?
    );
    assert_eq!(
        encode(&state, TransportKind::Usb)?,
        encode(&state, TransportKind::Usb)?
    );
    Ok(())
}
