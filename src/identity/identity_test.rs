use std::{error::Error, sync::Arc};

use crate::{
    identity::{
        address_from_pairing_info, address_from_serial, BluetoothRadio, ControllerIdentity,
        IdentityError, IdentityResolver, IdentitySource, RadioPeer,
    },
    transport::{
        mock::{dualsense, MockTransport},
        TransportKind,
    },
};

struct FakeRadio {
    peers: Vec<RadioPeer>,
}

impl BluetoothRadio for FakeRadio {
    fn peers(&self) -> Result<Vec<RadioPeer>, IdentityError> {
        Ok(self.peers.clone())
    }

    fn disconnect(&self, _address: &str) -> Result<bool, IdentityError> {
        Ok(false)
    }
}

fn peer(name: &str, address: &str, connected: bool) -> RadioPeer {
    RadioPeer {
        name: name.to_string(),
        address: address.to_string(),
        connected,
    }
}

#[test]
fn test_address_from_serial() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        address_from_serial("a0:ab:51:12:34:56"),
        Some("A0:AB:51:12:34:56".to_string())
    );
    assert_eq!(
        address_from_serial("A0-AB-51-12-34-56"),
        Some("A0:AB:51:12:34:56".to_string())
    );
    // The first run of 12 hex digits wins
    assert_eq!(
        address_from_serial("SN xyz a0ab51123456ffff"),
        Some("A0:AB:51:12:34:56".to_string())
    );
    assert_eq!(address_from_serial("12345"), None);
    assert_eq!(address_from_serial("a0ab51 123456"), None);
    assert_eq!(address_from_serial(""), None);
    Ok(())
}

#[test]
fn test_address_from_pairing_info() -> Result<(), Box<dyn Error>> {
    let mut report = [0u8; 20];
    report[0] = 0x09;
    report[1..7].copy_from_slice(&[0x56, 0x34, 0x12, 0x51, 0xab, 0xa0]);
    assert_eq!(
        address_from_pairing_info(&report),
        Some("A0:AB:51:12:34:56".to_string())
    );
    assert_eq!(address_from_pairing_info(&report[..5]), None);
    assert_eq!(address_from_pairing_info(&[0x09; 1]), None);
    assert_eq!(address_from_pairing_info(&[0u8; 20]), None);
    Ok(())
}

#[test]
fn test_identity_matches() -> Result<(), Box<dyn Error>> {
    let usb = ControllerIdentity {
        address: Some("a0:ab:51:12:34:56".to_string()),
        serial: None,
        transport: TransportKind::Usb,
        source: Some(IdentitySource::FeatureReport),
        path: "/dev/hidraw0".to_string(),
    };
    let bt = ControllerIdentity {
        address: Some("A0AB51123456".to_string()),
        serial: None,
        transport: TransportKind::Bluetooth,
        source: Some(IdentitySource::Radio),
        path: "/dev/hidraw1".to_string(),
    };
    assert!(usb.matches(&bt));

    let unresolved = ControllerIdentity {
        address: None,
        ..usb.clone()
    };
    assert!(!unresolved.matches(&unresolved));
    assert_eq!(unresolved.key(), "/dev/hidraw0");
    Ok(())
}

#[test]
fn test_resolve_prefers_radio() -> Result<(), Box<dyn Error>> {
    let radio = FakeRadio {
        peers: vec![
            peer("Keyboard", "11:22:33:44:55:66", true),
            peer("DualSense Wireless Controller", "a0:ab:51:00:00:01", true),
        ],
    };
    let resolver = IdentityResolver::new(Some(Arc::new(radio)));
    let device = dualsense(
        "/dev/hidraw1",
        TransportKind::Bluetooth,
        Some("a0:ab:51:ff:ff:ff"),
    );
    let transport = MockTransport::new(TransportKind::Bluetooth);

    let identity = resolver.resolve(&device, &transport);
    assert_eq!(identity.address.as_deref(), Some("A0:AB:51:00:00:01"));
    assert_eq!(identity.source, Some(IdentitySource::Radio));
    Ok(())
}

#[test]
fn test_resolve_radio_matches_serial() -> Result<(), Box<dyn Error>> {
    let radio: Arc<dyn BluetoothRadio> = Arc::new(FakeRadio {
        peers: vec![
            peer("DualSense Wireless Controller", "a0:ab:51:00:00:01", true),
            peer("DualSense Wireless Controller", "a0:ab:51:00:00:02", true),
        ],
    });
    let resolver = IdentityResolver::new(Some(radio));

    // Two Bluetooth controllers resolve to their own peers
    let first = dualsense(
        "/dev/hidraw1",
        TransportKind::Bluetooth,
        Some("a0ab51000001"),
    );
    let second = dualsense(
        "/dev/hidraw2",
        TransportKind::Bluetooth,
        Some("a0ab51000002"),
    );
    let transport = MockTransport::new(TransportKind::Bluetooth);

    let identity = resolver.resolve(&first, &transport);
    assert_eq!(identity.address.as_deref(), Some("A0:AB:51:00:00:01"));
    let identity = resolver.resolve(&second, &transport);
    assert_eq!(identity.address.as_deref(), Some("A0:AB:51:00:00:02"));
    assert_eq!(identity.source, Some(IdentitySource::Radio));
    Ok(())
}

#[test]
fn test_resolve_usb_skips_radio() -> Result<(), Box<dyn Error>> {
    let radio = FakeRadio {
        peers: vec![peer("DualSense Wireless Controller", "a0:ab:51:00:00:01", true)],
    };
    let resolver = IdentityResolver::new(Some(Arc::new(radio)));
    let device = dualsense("/dev/hidraw0", TransportKind::Usb, None);
    let transport = MockTransport::new(TransportKind::Usb);
    let mut report = vec![0u8; 20];
    report[0] = 0x09;
    report[1..7].copy_from_slice(&[0x02, 0x00, 0x00, 0x51, 0xab, 0xa0]);
    transport.set_feature_report(report);

    let identity = resolver.resolve(&device, &transport);
    assert_eq!(identity.address.as_deref(), Some("A0:AB:51:00:00:02"));
    assert_eq!(identity.source, Some(IdentitySource::FeatureReport));
    Ok(())
}

#[test]
fn test_resolve_serial_before_feature_report() -> Result<(), Box<dyn Error>> {
    let resolver = IdentityResolver::new(None);
    let device = dualsense(
        "/dev/hidraw1",
        TransportKind::Bluetooth,
        Some("a0:ab:51:12:34:56"),
    );
    let transport = MockTransport::new(TransportKind::Bluetooth);
    transport.set_feature_report(vec![0x09, 1, 2, 3, 4, 5, 6]);

    let identity = resolver.resolve(&device, &transport);
    assert_eq!(identity.address.as_deref(), Some("A0:AB:51:12:34:56"));
    assert_eq!(identity.source, Some(IdentitySource::SerialNumber));
    Ok(())
}

#[test]
fn test_resolve_failure_falls_back_to_path() -> Result<(), Box<dyn Error>> {
    let resolver = IdentityResolver::new(None);
    let device = dualsense("/dev/hidraw3", TransportKind::Usb, Some("nope"));
    let transport = MockTransport::new(TransportKind::Usb);

    let identity = resolver.resolve(&device, &transport);
    assert_eq!(identity.address, None);
    assert_eq!(identity.source, None);
    assert_eq!(identity.key(), "/dev/hidraw3");
    Ok(())
}
