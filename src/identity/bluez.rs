use std::collections::HashMap;

use zbus::{
    blocking::Connection,
    zvariant::{OwnedObjectPath, OwnedValue},
};

use super::{normalize, BluetoothRadio, IdentityError, RadioPeer};

const BLUEZ_SERVICE: &str = "org.bluez";
const BLUEZ_DEVICE_IFACE: &str = "org.bluez.Device1";
const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";

type ManagedObjects = HashMap<OwnedObjectPath, HashMap<String, HashMap<String, OwnedValue>>>;

/// [BluetoothRadio] backed by BlueZ on the system bus
pub struct BlueZRadio {
    conn: Connection,
}

impl BlueZRadio {
    pub fn new() -> Result<Self, IdentityError> {
        let conn = Connection::system()?;
        Ok(Self { conn })
    }

    /// Returns all BlueZ device objects along with their peer info
    fn devices(&self) -> Result<Vec<(OwnedObjectPath, RadioPeer)>, IdentityError> {
        let objects: ManagedObjects = self
            .conn
            .call_method(
                Some(BLUEZ_SERVICE),
                "/",
                Some(OBJECT_MANAGER_IFACE),
                "GetManagedObjects",
                &(),
            )?
            .body()
            .deserialize()?;

        let mut devices = Vec::new();
        for (path, interfaces) in objects {
            let Some(props) = interfaces.get(BLUEZ_DEVICE_IFACE) else {
                continue;
            };
            let Some(address) = string_property(props, "Address") else {
                continue;
            };
            let name = string_property(props, "Name").unwrap_or_default();
            let connected = props
                .get("Connected")
                .and_then(|v| bool::try_from(v).ok())
                .unwrap_or_default();
            devices.push((
                path,
                RadioPeer {
                    name,
                    address,
                    connected,
                },
            ));
        }

        Ok(devices)
    }
}

fn string_property(props: &HashMap<String, OwnedValue>, name: &str) -> Option<String> {
    let value = props.get(name)?;
    <&str>::try_from(value).ok().map(String::from)
}

impl BluetoothRadio for BlueZRadio {
    fn peers(&self) -> Result<Vec<RadioPeer>, IdentityError> {
        let peers = self.devices()?.into_iter().map(|(_, peer)| peer).collect();
        Ok(peers)
    }

    fn disconnect(&self, address: &str) -> Result<bool, IdentityError> {
        let wanted = normalize(address);
        let devices = self.devices()?;
        let Some((path, peer)) = devices
            .into_iter()
            .find(|(_, peer)| normalize(&peer.address) == wanted)
        else {
            log::debug!("No Bluetooth peer found with address {address}");
            return Ok(false);
        };

        log::info!("Disconnecting Bluetooth peer {} ({})", peer.name, peer.address);
        self.conn.call_method(
            Some(BLUEZ_SERVICE),
            path.as_str(),
            Some(BLUEZ_DEVICE_IFACE),
            "Disconnect",
            &(),
        )?;

        Ok(true)
    }
}
