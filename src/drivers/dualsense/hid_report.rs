//! Structures derived from the great work of the community of the Game Controller
//! Collective Wiki.
//! Source: https://controllers.fandom.com/wiki/Sony_DualSense
use packed_struct::prelude::*;

use super::{
    state::{LightbarBehavior, MicLed, PlayerLedBrightness},
    INPUT_REPORT_BT, INPUT_REPORT_USB, OUTPUT_REPORT_BT, OUTPUT_REPORT_BT_HEADER,
    OUTPUT_REPORT_USB,
};

/// A single touch contact. On the wire this is a little-endian 32-bit word:
/// bits 0-6 contact index, bit 7 "not touching", bits 8-19 x, bits 20-31 y.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct TouchFingerData {
    // byte 0
    #[packed_field(bits = "0")]
    pub not_touching: bool,
    #[packed_field(bits = "1..=7")]
    pub index: Integer<u8, packed_bits::Bits<7>>,
    // byte 1
    #[packed_field(bytes = "1")]
    pub x_lo: u8,
    // byte 2
    #[packed_field(bits = "16..=19")]
    pub y_lo: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "20..=23")]
    pub x_hi: Integer<u8, packed_bits::Bits<4>>,
    // byte 3
    #[packed_field(bytes = "3")]
    pub y_hi: u8,
}

impl Default for TouchFingerData {
    fn default() -> Self {
        Self {
            not_touching: true,
            index: Default::default(),
            x_lo: Default::default(),
            y_lo: Default::default(),
            x_hi: Default::default(),
            y_hi: Default::default(),
        }
    }
}

impl TouchFingerData {
    pub fn is_touching(&self) -> bool {
        !self.not_touching
    }

    pub fn get_x(&self) -> u16 {
        let x_hi = self.x_hi.to_primitive() as u16;
        let x_hi = x_hi.rotate_left(8);
        x_hi | self.x_lo as u16
    }

    pub fn get_y(&self) -> u16 {
        let y_lo = self.y_lo.to_primitive() as u16;
        let y_hi = (self.y_hi as u16).rotate_left(4);
        y_hi | y_lo
    }

    pub fn set_x(&mut self, x_raw: u16) {
        self.x_lo = (x_raw & 0x00FF) as u8;
        self.x_hi = Integer::from_primitive((x_raw & 0x0F00).rotate_right(8) as u8);
    }

    pub fn set_y(&mut self, y_raw: u16) {
        self.y_lo = Integer::from_primitive((y_raw & 0x000F) as u8);
        self.y_hi = (y_raw & 0x0FF0).rotate_right(4) as u8;
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct TouchData {
    #[packed_field(element_size_bytes = "4")]
    pub touch_finger_data: [TouchFingerData; 2],
    pub timestamp: u8,
}

/// Input state block shared by the USB and Bluetooth input reports. The
/// d-pad and power state are kept as raw nibbles since the controller may
/// report values outside of the documented set.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "63")]
pub struct PackedInputState {
    // byte 0-6
    #[packed_field(bytes = "0")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "1")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "2")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_y: u8,
    #[packed_field(bytes = "4")]
    pub l2_trigger: u8,
    #[packed_field(bytes = "5")]
    pub r2_trigger: u8,
    #[packed_field(bytes = "6")]
    pub seq_number: u8,

    // byte 7
    #[packed_field(bits = "56")]
    pub triangle: bool,
    #[packed_field(bits = "57")]
    pub circle: bool,
    #[packed_field(bits = "58")]
    pub cross: bool,
    #[packed_field(bits = "59")]
    pub square: bool,
    #[packed_field(bits = "60..=63")]
    pub dpad: Integer<u8, packed_bits::Bits<4>>,

    // byte 8
    #[packed_field(bits = "64")]
    pub r3: bool,
    #[packed_field(bits = "65")]
    pub l3: bool,
    #[packed_field(bits = "66")]
    pub options: bool,
    #[packed_field(bits = "67")]
    pub create: bool,
    #[packed_field(bits = "68")]
    pub r2: bool,
    #[packed_field(bits = "69")]
    pub l2: bool,
    #[packed_field(bits = "70")]
    pub r1: bool,
    #[packed_field(bits = "71")]
    pub l1: bool,

    // byte 9
    #[packed_field(bits = "72")]
    pub right_paddle: bool, // DualSense Edge
    #[packed_field(bits = "73")]
    pub left_paddle: bool, // DualSense Edge
    #[packed_field(bits = "74")]
    pub right_fn: bool, // DualSense Edge
    #[packed_field(bits = "75")]
    pub left_fn: bool, // DualSense Edge
    #[packed_field(bits = "76")]
    pub _unkn_0: bool,
    #[packed_field(bits = "77")]
    pub mute: bool,
    #[packed_field(bits = "78")]
    pub touchpad: bool,
    #[packed_field(bits = "79")]
    pub ps: bool,

    // byte 10-14
    #[packed_field(bytes = "10")]
    pub _unkn_1: u8,
    #[packed_field(bytes = "11..=14", endian = "lsb")]
    pub _unkn_counter: Integer<u32, packed_bits::Bits<32>>,

    // byte 15-26, gyro is sent as x/z/y
    #[packed_field(bytes = "15..=16", endian = "lsb")]
    pub gyro_x: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "17..=18", endian = "lsb")]
    pub gyro_z: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "19..=20", endian = "lsb")]
    pub gyro_y: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "21..=22", endian = "lsb")]
    pub accel_x: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "23..=24", endian = "lsb")]
    pub accel_y: Integer<i16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "25..=26", endian = "lsb")]
    pub accel_z: Integer<i16, packed_bits::Bits<16>>,

    // byte 27-31
    #[packed_field(bytes = "27..=30", endian = "lsb")]
    pub sensor_timestamp: Integer<u32, packed_bits::Bits<32>>,
    #[packed_field(bytes = "31")]
    pub temperature: u8,

    // byte 32-40
    #[packed_field(bytes = "32..=40")]
    pub touch_data: TouchData,

    // byte 41-51, adaptive trigger feedback and timestamps
    #[packed_field(bytes = "41..=51")]
    pub _trigger_status: [u8; 11],

    // byte 52
    #[packed_field(bits = "416..=419", endian = "lsb")]
    pub power_state: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "420..=423", endian = "lsb")]
    pub power_percent: Integer<u8, packed_bits::Bits<4>>,

    // byte 53
    #[packed_field(bits = "424..=426", endian = "lsb")]
    pub _plugged_unkn_0: Integer<u8, packed_bits::Bits<3>>,
    #[packed_field(bits = "427")]
    pub plugged_usb_power: bool,
    #[packed_field(bits = "428")]
    pub plugged_usb_data: bool,
    #[packed_field(bits = "429")]
    pub mic_muted: bool,
    #[packed_field(bits = "430")]
    pub plugged_mic: bool,
    #[packed_field(bits = "431")]
    pub plugged_headphones: bool,

    // byte 54-62
    #[packed_field(bytes = "54..=62")]
    pub _reserved: [u8; 9],
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "64")]
pub struct USBPackedInputDataReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8, // Report ID (always 0x01)

    // byte 1-63
    #[packed_field(bytes = "1..=63")]
    pub state: PackedInputState,
}

impl Default for USBPackedInputDataReport {
    fn default() -> Self {
        Self {
            report_id: INPUT_REPORT_USB,
            state: Default::default(),
        }
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "78")]
pub struct BluetoothPackedInputDataReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8, // Report ID (always 0x31)

    // byte 1
    #[packed_field(bytes = "1")]
    pub seq_number: u8,

    // byte 2-64
    #[packed_field(bytes = "2..=64")]
    pub state: PackedInputState,

    // byte 65-77
    #[packed_field(bytes = "65..=73")]
    pub _unkn_0: [u8; 9],
    #[packed_field(bytes = "74..=77", endian = "lsb")]
    pub crc: Integer<u32, packed_bits::Bits<32>>,
}

impl Default for BluetoothPackedInputDataReport {
    fn default() -> Self {
        Self {
            report_id: INPUT_REPORT_BT,
            seq_number: Default::default(),
            state: Default::default(),
            _unkn_0: Default::default(),
            crc: Default::default(),
        }
    }
}

/// State data common to USB and Bluetooth output reports. Only the lighting
/// section is driven; audio, haptics and trigger effects are left disabled.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Default)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "47")]
pub struct SetStatePackedOutputData {
    // byte 0, audio and haptics enables
    #[packed_field(bytes = "0")]
    pub valid_flag0: u8,

    // byte 1
    #[packed_field(bits = "8")]
    pub allow_audio_control2: bool,
    #[packed_field(bits = "9")]
    pub allow_motor_power_level: bool,
    #[packed_field(bits = "10")]
    pub allow_haptic_low_pass_filter: bool,
    #[packed_field(bits = "11")]
    pub allow_player_indicators: bool,
    #[packed_field(bits = "12")]
    pub reset_lights: bool,
    #[packed_field(bits = "13")]
    pub allow_led_color: bool,
    #[packed_field(bits = "14")]
    pub allow_power_save: bool,
    #[packed_field(bits = "15")]
    pub allow_mute_light: bool,

    // byte 2-7
    #[packed_field(bytes = "2..=7")]
    pub _audio: [u8; 6],

    // byte 8
    #[packed_field(bytes = "8", ty = "enum")]
    pub mute_light_mode: MicLed,

    // byte 9-37
    #[packed_field(bytes = "9..=37")]
    pub _haptics: [u8; 29],

    // byte 38
    #[packed_field(bits = "304..=309", endian = "lsb")]
    pub _unkn_bitc: Integer<u8, packed_bits::Bits<6>>,
    #[packed_field(bits = "310")]
    pub allow_color_light_fade_animation: bool,
    #[packed_field(bits = "311")]
    pub allow_light_brightness_change: bool,

    // byte 39-40
    #[packed_field(bytes = "39..=40")]
    pub _unkn_bit_2: [u8; 2],

    // byte 41-42
    #[packed_field(bytes = "41", ty = "enum")]
    pub lightbar_behavior: LightbarBehavior,
    #[packed_field(bytes = "42", ty = "enum")]
    pub player_light_brightness: PlayerLedBrightness,

    // byte 43
    #[packed_field(bits = "344..=345", endian = "lsb")]
    pub _player_light_unkn: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "346")]
    pub player_light_instant: bool,
    #[packed_field(bits = "347..=351", endian = "lsb")]
    pub player_lights: Integer<u8, packed_bits::Bits<5>>,

    // byte 44-46
    #[packed_field(bytes = "44")]
    pub led_red: u8,
    #[packed_field(bytes = "45")]
    pub led_green: u8,
    #[packed_field(bytes = "46")]
    pub led_blue: u8,
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "48")]
pub struct UsbPackedOutputReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8, // Report ID (always 0x02)

    // byte 1-47
    #[packed_field(bytes = "1..=47")]
    pub state: SetStatePackedOutputData,
}

impl Default for UsbPackedOutputReport {
    fn default() -> Self {
        Self {
            report_id: OUTPUT_REPORT_USB,
            state: Default::default(),
        }
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "78")]
pub struct BluetoothPackedOutputReport {
    // byte 0
    #[packed_field(bytes = "0")]
    pub report_id: u8, // Report ID (always 0x31)

    // byte 1
    #[packed_field(bytes = "1")]
    pub header: u8,

    // byte 2-48
    #[packed_field(bytes = "2..=48")]
    pub state: SetStatePackedOutputData,

    // byte 49-73
    #[packed_field(bytes = "49..=73")]
    pub _reserved: [u8; 25],

    // byte 74-77
    #[packed_field(bytes = "74..=77", endian = "lsb")]
    pub crc: Integer<u32, packed_bits::Bits<32>>,
}

impl Default for BluetoothPackedOutputReport {
    fn default() -> Self {
        Self {
            report_id: OUTPUT_REPORT_BT,
            header: OUTPUT_REPORT_BT_HEADER,
            state: Default::default(),
            _reserved: Default::default(),
            crc: Default::default(),
        }
    }
}
