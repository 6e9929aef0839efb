//! Fake HID devices for driving the library without hardware
#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    time::Duration,
};

use dualsense_hub::{
    drivers::dualsense::{DS5_PID, DS5_VID},
    transport::{DeviceDescriptor, DeviceProvider, Transport, TransportError, TransportKind},
};

const POLL: Duration = Duration::from_millis(20);

pub struct FakeController {
    kind: TransportKind,
    reports_tx: Mutex<mpsc::Sender<Vec<u8>>>,
    reports_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl FakeController {
    pub fn new(kind: TransportKind) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            kind,
            reports_tx: Mutex::new(tx),
            reports_rx: Mutex::new(rx),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn send(&self, report: Vec<u8>) {
        if let Ok(tx) = self.reports_tx.lock() {
            let _ = tx.send(report);
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Wait until at least `count` output reports were written
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let start = std::time::Instant::now();
        loop {
            let writes = self.writes();
            if writes.len() >= count || start.elapsed() > timeout {
                return writes;
            }
            std::thread::sleep(POLL);
        }
    }
}

impl Transport for FakeController {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let rx = self.reports_rx.lock().map_err(|_| TransportError::Closed)?;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match rx.recv_timeout(POLL) {
                Ok(report) => {
                    let len = report.len().min(buf.len());
                    buf[..len].copy_from_slice(&report[..len]);
                    return Ok(len);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if let Ok(mut written) = self.written.lock() {
            written.push(buf.to_vec());
        }
        Ok(buf.len())
    }

    fn get_feature_report(&self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Err(TransportError::Other("not supported".to_string()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeProvider {
    devices: Mutex<Vec<(DeviceDescriptor, Arc<FakeController>)>>,
}

impl FakeProvider {
    pub fn plug(&self, path: &str, kind: TransportKind, serial: &str) -> Arc<FakeController> {
        let device = DeviceDescriptor {
            path: path.to_string(),
            vendor_id: DS5_VID,
            product_id: DS5_PID,
            transport: kind,
            serial_number: Some(serial.to_string()),
            product_name: Some("DualSense Wireless Controller".to_string()),
        };
        let controller = Arc::new(FakeController::new(kind));
        if let Ok(mut devices) = self.devices.lock() {
            devices.push((device, controller.clone()));
        }
        controller
    }

    pub fn unplug(&self, path: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|(device, _)| device.path != path);
        }
    }
}

impl DeviceProvider for FakeProvider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let devices = self.devices.lock().map_err(|_| TransportError::Closed)?;
        Ok(devices.iter().map(|(device, _)| device.clone()).collect())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<Arc<dyn Transport>, TransportError> {
        let mut devices = self.devices.lock().map_err(|_| TransportError::Closed)?;
        let Some((_, controller)) = devices.iter_mut().find(|(d, _)| d.path == device.path)
        else {
            return Err(TransportError::Gone(device.path.clone()));
        };
        if controller.closed.load(Ordering::SeqCst) {
            *controller = Arc::new(FakeController::new(device.transport));
        }
        Ok(controller.clone())
    }
}

/// Bluetooth input report with the given button bytes (face/d-pad, shoulder,
/// system) and raw battery nibble
pub fn bluetooth_report(buttons: [u8; 3], battery: u8) -> Vec<u8> {
    let mut buf = vec![0u8; 78];
    buf[0] = 0x31;
    buf[2..=5].copy_from_slice(&[0x80; 4]);
    buf[9..=11].copy_from_slice(&buttons);
    buf[2 + 32] = 0x80;
    buf[2 + 36] = 0x80;
    buf[54] = battery & 0x0f;
    buf
}
