pub mod checksum;
pub mod codec;
pub mod event;
pub mod hid_report;
pub mod state;

#[cfg(test)]
pub mod codec_test;
#[cfg(test)]
pub mod event_test;

// Source: https://github.com/torvalds/linux/blob/master/drivers/hid/hid-playstation.c
pub const DS5_EDGE_NAME: &str = "Sony Interactive Entertainment DualSense Edge Wireless Controller";
pub const DS5_EDGE_PID: u16 = 0x0df2;

pub const DS5_NAME: &str = "Sony Interactive Entertainment DualSense Wireless Controller";
pub const DS5_VID: u16 = 0x054c;
pub const DS5_PID: u16 = 0x0ce6;

pub const PIDS: [u16; 2] = [DS5_EDGE_PID, DS5_PID];

/// Name fragment advertised over Bluetooth by both DualSense models
pub const DS5_MARKETING_NAME: &str = "DualSense";

pub const FEATURE_REPORT_PAIRING_INFO: u8 = 0x09;
pub const FEATURE_REPORT_PAIRING_INFO_SIZE: usize = 20;

pub const INPUT_REPORT_USB: u8 = 0x01;
pub const INPUT_REPORT_USB_SIZE: usize = 64;
pub const INPUT_REPORT_BT: u8 = 0x31;
pub const INPUT_REPORT_BT_SIZE: usize = 78;
/// Bluetooth controllers send this id while in the reduced input mode
pub const INPUT_REPORT_BT_SIMPLE: u8 = 0x01;
pub const INPUT_REPORT_BT_MIN_SIZE: usize = 10;
/// Size of the input state block shared by USB and Bluetooth reports
pub const INPUT_STATE_SIZE: usize = 63;

pub const OUTPUT_REPORT_USB: u8 = 0x02;
pub const OUTPUT_REPORT_USB_SIZE: usize = 48;
pub const OUTPUT_REPORT_BT: u8 = 0x31;
pub const OUTPUT_REPORT_BT_SIZE: usize = 78;
/// Fixed byte following the Bluetooth output report id
pub const OUTPUT_REPORT_BT_HEADER: u8 = 0x02;
pub const OUTPUT_REPORT_BT_CRC_OFFSET: usize = OUTPUT_REPORT_BT_SIZE - 4;

// DualSense hardware limits
pub const DS5_TOUCHPAD_WIDTH: u16 = 1920;
pub const DS5_TOUCHPAD_HEIGHT: u16 = 1080;
pub const DS5_BATTERY_RAW_MAX: u8 = 8;
