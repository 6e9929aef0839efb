pub mod bluez;
#[cfg(test)]
pub mod identity_test;

use std::{fmt::Display, sync::Arc};

use serde::Serialize;
use thiserror::Error;

use crate::{
    drivers::dualsense::{
        DS5_MARKETING_NAME, FEATURE_REPORT_PAIRING_INFO, FEATURE_REPORT_PAIRING_INFO_SIZE,
    },
    transport::{DeviceDescriptor, Transport, TransportError, TransportKind},
};

/// Number of hex digits in a hardware address
const ADDRESS_HEX_DIGITS: usize = 12;
/// Offset of the address inside the pairing info feature report
const PAIRING_INFO_ADDRESS_OFFSET: usize = 1;
const ADDRESS_SIZE: usize = 6;

/// Possible errors while resolving a controller identity
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),
    #[error("D-Bus value error: {0}")]
    Value(#[from] zbus::zvariant::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("No address found")]
    NotFound,
}

/// A device known to the host's Bluetooth radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPeer {
    pub name: String,
    pub address: String,
    pub connected: bool,
}

/// Access to the host's Bluetooth radio
pub trait BluetoothRadio: Send + Sync {
    /// Returns all paired or visible peers
    fn peers(&self) -> Result<Vec<RadioPeer>, IdentityError>;
    /// Disconnect the peer with the given address. Returns false if no such
    /// peer is known.
    fn disconnect(&self, address: &str) -> Result<bool, IdentityError>;
}

/// How the address of an identity was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentitySource {
    Radio,
    SerialNumber,
    FeatureReport,
}

impl Display for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentitySource::Radio => write!(f, "radio"),
            IdentitySource::SerialNumber => write!(f, "serial"),
            IdentitySource::FeatureReport => write!(f, "feature report"),
        }
    }
}

/// Transport independent identity of a physical controller. Used only to
/// correlate the same controller seen over USB and Bluetooth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerIdentity {
    /// Uppercase colon separated address (e.g. "A0:AB:51:12:34:56")
    pub address: Option<String>,
    pub serial: Option<String>,
    pub transport: TransportKind,
    pub source: Option<IdentitySource>,
    /// Device path, used as the key when no address could be resolved
    pub path: String,
}

impl ControllerIdentity {
    /// Identity for a device whose address could not be resolved
    pub fn unresolved(device: &DeviceDescriptor) -> Self {
        Self {
            address: None,
            serial: device.serial_number.clone(),
            transport: device.transport,
            source: None,
            path: device.path.clone(),
        }
    }

    /// Stable key for this controller: the address if known, otherwise the
    /// device path (which will not survive a replug).
    pub fn key(&self) -> String {
        self.address.clone().unwrap_or_else(|| self.path.clone())
    }

    /// Returns true if both identities resolve to the same hardware address.
    /// Identities without an address never match anything.
    pub fn matches(&self, other: &ControllerIdentity) -> bool {
        match (&self.address, &other.address) {
            (Some(a), Some(b)) => normalize(a) == normalize(b),
            _ => false,
        }
    }
}

impl Display for ControllerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.address.as_ref() {
            Some(address) => write!(f, "{address} ({})", self.transport),
            None => write!(f, "{} ({})", self.path, self.transport),
        }
    }
}

/// Strip punctuation and case fold an address for comparison
pub fn normalize(address: &str) -> String {
    address
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Format the given bytes as an uppercase colon separated address
pub fn format_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<String>>()
        .join(":")
}

/// Extract an address from a serial number string. Separators are removed
/// and the first run of 12 contiguous hex digits is used.
pub fn address_from_serial(serial: &str) -> Option<String> {
    let mut digits = String::with_capacity(ADDRESS_HEX_DIGITS);
    for c in serial.chars().filter(|c| *c != ':' && *c != '-') {
        if c.is_ascii_hexdigit() {
            digits.push(c.to_ascii_uppercase());
            if digits.len() == ADDRESS_HEX_DIGITS {
                break;
            }
        } else {
            digits.clear();
        }
    }
    if digits.len() != ADDRESS_HEX_DIGITS {
        return None;
    }

    let pairs: Vec<&str> = (0..ADDRESS_HEX_DIGITS)
        .step_by(2)
        .filter_map(|i| digits.get(i..i + 2))
        .collect();
    Some(pairs.join(":"))
}

/// Extract the address from a pairing info feature report. The address is
/// stored least significant byte first.
pub fn address_from_pairing_info(report: &[u8]) -> Option<String> {
    let end = PAIRING_INFO_ADDRESS_OFFSET + ADDRESS_SIZE;
    let bytes = report.get(PAIRING_INFO_ADDRESS_OFFSET..end)?;
    if bytes.iter().all(|b| *b == 0) {
        return None;
    }
    let mut bytes = bytes.to_vec();
    bytes.reverse();
    Some(format_address(&bytes))
}

/// Derives [ControllerIdentity] for newly discovered devices
pub struct IdentityResolver {
    radio: Option<Arc<dyn BluetoothRadio>>,
    marketing_name: String,
}

impl IdentityResolver {
    pub fn new(radio: Option<Arc<dyn BluetoothRadio>>) -> Self {
        Self {
            radio,
            marketing_name: DS5_MARKETING_NAME.to_string(),
        }
    }

    /// Resolve the identity of the given device. The radio is consulted for
    /// Bluetooth devices, then the serial number, then the pairing info
    /// feature report. The first method to produce an address wins.
    pub fn resolve(
        &self,
        device: &DeviceDescriptor,
        transport: &dyn Transport,
    ) -> ControllerIdentity {
        let mut identity = ControllerIdentity::unresolved(device);

        let sources = [
            IdentitySource::Radio,
            IdentitySource::SerialNumber,
            IdentitySource::FeatureReport,
        ];
        for source in sources {
            let result = match source {
                IdentitySource::Radio => self.from_radio(device),
                IdentitySource::SerialNumber => Self::from_serial(device),
                IdentitySource::FeatureReport => Self::from_feature_report(transport),
            };
            match result {
                Ok(address) => {
                    log::debug!("Resolved {} to {address} using {source}", device.path);
                    identity.address = Some(address);
                    identity.source = Some(source);
                    return identity;
                }
                Err(e) => {
                    log::debug!("Unable to resolve {} using {source}: {e}", device.path);
                }
            }
        }

        log::info!(
            "No address found for {}, falling back to the device path",
            device.path
        );
        identity
    }

    fn from_radio(&self, device: &DeviceDescriptor) -> Result<String, IdentityError> {
        if device.transport != TransportKind::Bluetooth {
            return Err(IdentityError::NotFound);
        }
        let Some(radio) = self.radio.as_ref() else {
            return Err(IdentityError::NotFound);
        };
        let peers = radio.peers()?;
        let candidates: Vec<&RadioPeer> = peers
            .iter()
            .filter(|peer| peer.name.contains(&self.marketing_name))
            .collect();

        // With several controllers paired, the one whose address is in the
        // device serial is the right peer
        let wanted = Self::from_serial(device).ok().map(|address| normalize(&address));
        let peer = candidates
            .iter()
            .find(|peer| Some(normalize(&peer.address)) == wanted)
            .or_else(|| candidates.iter().find(|peer| peer.connected))
            .or_else(|| candidates.first())
            .ok_or(IdentityError::NotFound)?;
        let address = address_from_serial(&peer.address).ok_or(IdentityError::NotFound)?;
        Ok(address)
    }

    fn from_serial(device: &DeviceDescriptor) -> Result<String, IdentityError> {
        device
            .serial_number
            .as_deref()
            .and_then(address_from_serial)
            .ok_or(IdentityError::NotFound)
    }

    fn from_feature_report(transport: &dyn Transport) -> Result<String, IdentityError> {
        let mut buf = [0u8; FEATURE_REPORT_PAIRING_INFO_SIZE];
        buf[0] = FEATURE_REPORT_PAIRING_INFO;
        let bytes_read = transport.get_feature_report(&mut buf)?;
        address_from_pairing_info(&buf[..bytes_read]).ok_or(IdentityError::NotFound)
    }
}
