use std::{
    ffi::CString,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use hidapi::{BusType, DeviceInfo, HidApi, HidDevice};

use super::{DeviceDescriptor, DeviceProvider, Transport, TransportError, TransportKind};

/// How long a single blocking read waits before checking whether the device
/// has been closed.
const READ_POLL_MS: i32 = 50;

/// [Transport] backed by a hidraw device. Reads and writes go through separate
/// handles so that output reports are never queued behind a pending read.
pub struct HidTransport {
    path: String,
    kind: TransportKind,
    reader: Mutex<Option<HidDevice>>,
    writer: Mutex<Option<HidDevice>>,
    closed: AtomicBool,
}

impl HidTransport {
    pub fn new(api: &HidApi, path: &str, kind: TransportKind) -> Result<Self, TransportError> {
        let c_path = CString::new(path).map_err(|e| TransportError::Other(e.to_string()))?;
        let reader = api.open_path(&c_path)?;
        let writer = api.open_path(&c_path)?;

        Ok(Self {
            path: path.to_string(),
            kind,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the full path to the device handler (e.g. /dev/hidraw0)
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for HidTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut reader = self.reader.lock().map_err(|_| TransportError::Closed)?;
        loop {
            if self.is_closed() {
                // Release the handle as soon as the reader notices
                reader.take();
                return Ok(0);
            }
            let Some(device) = reader.as_ref() else {
                return Ok(0);
            };
            let bytes_read = device.read_timeout(buf, READ_POLL_MS)?;
            if bytes_read > 0 {
                return Ok(bytes_read);
            }
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let writer = self.writer.lock().map_err(|_| TransportError::Closed)?;
        let Some(device) = writer.as_ref() else {
            return Err(TransportError::Closed);
        };
        let written = device.write(buf)?;
        if written < buf.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        Ok(written)
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let writer = self.writer.lock().map_err(|_| TransportError::Closed)?;
        let Some(device) = writer.as_ref() else {
            return Err(TransportError::Closed);
        };
        Ok(device.get_feature_report(buf)?)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("Closing HID device: {}", self.path);
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        // The reader handle is dropped here unless a read is in progress, in
        // which case the reader drops it on its next poll.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }
}

/// [DeviceProvider] enumerating devices through hidapi. A fresh [HidApi]
/// context is created for each call so the device list is always current.
pub struct HidProvider {}

impl HidProvider {
    pub fn new() -> Result<Self, TransportError> {
        // Fail early if hidapi can't be initialized at all
        HidApi::new()?;
        Ok(Self {})
    }
}

/// Returns the transport kind for the given device, if it is one a DualSense
/// can be attached through.
fn transport_kind(info: &DeviceInfo) -> Option<TransportKind> {
    match info.bus_type() {
        BusType::Usb => Some(TransportKind::Usb),
        BusType::Bluetooth => Some(TransportKind::Bluetooth),
        _ => None,
    }
}

impl DeviceProvider for HidProvider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let api = HidApi::new()?;

        let devices = api
            .device_list()
            .filter_map(|info| {
                let path = info.path().to_string_lossy().to_string();
                let Some(transport) = transport_kind(info) else {
                    log::trace!("Skipping device on unsupported bus: {path}");
                    return None;
                };
                Some(DeviceDescriptor {
                    path,
                    vendor_id: info.vendor_id(),
                    product_id: info.product_id(),
                    transport,
                    serial_number: info
                        .serial_number()
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                    product_name: info.product_string().map(String::from),
                })
            })
            .collect();

        Ok(devices)
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<Arc<dyn Transport>, TransportError> {
        let api = HidApi::new()?;
        let transport = HidTransport::new(&api, &device.path, device.transport)?;
        log::debug!("Opened {} device: {}", device.transport, transport.path());
        Ok(Arc::new(transport))
    }
}
