pub mod hidraw;
#[cfg(test)]
pub mod mock;

use std::{fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a controller is attached to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Bluetooth,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Usb => write!(f, "USB"),
            TransportKind::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// Possible errors while talking to a HID device
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("Device is closed")]
    Closed,
    #[error("Device is gone: {0}")]
    Gone(String),
    #[error("Wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if this error indicates the device was unplugged or the
    /// link was lost, as opposed to an unexpected failure.
    pub fn is_device_gone(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::Gone(_) => true,
            TransportError::Hid(e) => {
                let msg = e.to_string();
                ["No such device", "Input/output error", "not connected"]
                    .iter()
                    .any(|needle| msg.contains(needle))
            }
            _ => false,
        }
    }
}

/// An open HID device. Reads block until a report arrives or the device is
/// closed; a read of zero bytes means the stream has ended.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
    fn write(&self, buf: &[u8]) -> Result<usize, TransportError>;
    /// Read the feature report whose id is in `buf[0]`
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
    /// Close the device, unblocking any pending read
    fn close(&self);
}

/// Description of an enumerated HID device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Platform device path (e.g. /dev/hidraw0)
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub transport: TransportKind,
    pub serial_number: Option<String>,
    pub product_name: Option<String>,
}

/// Source of HID devices
pub trait DeviceProvider: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError>;
    fn open(&self, device: &DeviceDescriptor) -> Result<Arc<dyn Transport>, TransportError>;
}
