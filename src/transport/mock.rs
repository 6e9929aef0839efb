//! In-memory transports for exercising sessions and the registry without
//! hardware.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
};

use super::{DeviceDescriptor, DeviceProvider, Transport, TransportError, TransportKind};

enum ReadStep {
    Report(Vec<u8>),
    Error(TransportError),
    End,
}

pub struct MockTransport {
    kind: TransportKind,
    steps: Mutex<VecDeque<ReadStep>>,
    ready: Condvar,
    written: Mutex<Vec<Vec<u8>>>,
    feature_report: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            steps: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            written: Mutex::new(Vec::new()),
            feature_report: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, step: ReadStep) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self.ready.notify_all();
    }

    /// Queue an input report for the reader
    pub fn push_report(&self, report: Vec<u8>) {
        self.push(ReadStep::Report(report));
    }

    /// Queue a read error
    pub fn push_error(&self, error: TransportError) {
        self.push(ReadStep::Error(error));
    }

    /// Queue a zero-byte read
    pub fn push_end(&self) {
        self.push(ReadStep::End);
    }

    pub fn set_feature_report(&self, report: Vec<u8>) {
        if let Ok(mut feature) = self.feature_report.lock() {
            *feature = Some(report);
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All output reports written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut steps = self.steps.lock().map_err(|_| TransportError::Closed)?;
        loop {
            if self.is_closed() {
                return Ok(0);
            }
            if let Some(step) = steps.pop_front() {
                return match step {
                    ReadStep::Report(report) => {
                        let len = report.len().min(buf.len());
                        buf[..len].copy_from_slice(&report[..len]);
                        Ok(len)
                    }
                    ReadStep::Error(e) => Err(e),
                    ReadStep::End => Ok(0),
                };
            }
            steps = self.ready.wait(steps).map_err(|_| TransportError::Closed)?;
        }
    }

    fn write(&self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Other("write failed".to_string()));
        }
        if let Ok(mut written) = self.written.lock() {
            written.push(buf.to_vec());
        }
        Ok(buf.len())
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let feature = self.feature_report.lock().map_err(|_| TransportError::Closed)?;
        let Some(report) = feature.as_ref() else {
            return Err(TransportError::Other("no feature report".to_string()));
        };
        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);
        Ok(len)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Take the lock so a reader between its closed check and wait() can't
        // miss the wakeup
        let _steps = self.steps.lock();
        self.ready.notify_all();
    }
}

/// Provider handing out [MockTransport]s for a mutable device list
#[derive(Default)]
pub struct MockProvider {
    devices: Mutex<Vec<(DeviceDescriptor, Arc<MockTransport>)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device, returning the transport sessions will read from
    pub fn add(&self, device: DeviceDescriptor) -> Arc<MockTransport> {
        let transport = Arc::new(MockTransport::new(device.transport));
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|(d, _)| d.path != device.path);
            devices.push((device, transport.clone()));
        }
        transport
    }

    /// The transport most recently opened for the given path
    pub fn transport(&self, path: &str) -> Option<Arc<MockTransport>> {
        let devices = self.devices.lock().ok()?;
        devices
            .iter()
            .find(|(d, _)| d.path == path)
            .map(|(_, transport)| transport.clone())
    }

    /// Unplug the device with the given path
    pub fn remove(&self, path: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|(d, _)| d.path != path);
        }
    }
}

impl DeviceProvider for MockProvider {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let devices = self.devices.lock().map_err(|_| TransportError::Closed)?;
        Ok(devices.iter().map(|(d, _)| d.clone()).collect())
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<Arc<dyn Transport>, TransportError> {
        let mut devices = self.devices.lock().map_err(|_| TransportError::Closed)?;
        let Some((_, transport)) = devices.iter_mut().find(|(d, _)| d.path == device.path) else {
            return Err(TransportError::Gone(device.path.clone()));
        };
        // Reopening a node gives a fresh handle
        if transport.is_closed() {
            *transport = Arc::new(MockTransport::new(device.transport));
        }
        Ok(transport.clone())
    }
}

/// Descriptor for a DualSense on the given path
pub fn dualsense(path: &str, transport: TransportKind, serial: Option<&str>) -> DeviceDescriptor {
    DeviceDescriptor {
        path: path.to_string(),
        vendor_id: crate::drivers::dualsense::DS5_VID,
        product_id: crate::drivers::dualsense::DS5_PID,
        transport,
        serial_number: serial.map(String::from),
        product_name: Some("DualSense Wireless Controller".to_string()),
    }
}
