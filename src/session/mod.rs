
use std::{
    fmt::Display,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use packed_struct::PackingError;
use serde::Serialize;
use thiserror::Error;

use crate::{
    drivers::dualsense::{
        codec::{self, RejectReason},
        event::{translate, Event},
        state::{
            BatteryState, ControllerState, LightbarBehavior, MicLed, OutputState,
            PlayerLedBrightness, Rgb, PLAYER_LED_MASK,
        },
        INPUT_REPORT_BT_SIZE,
    },
    identity::{BluetoothRadio, ControllerIdentity},
    transport::{DeviceDescriptor, Transport, TransportError, TransportKind},
};

/// Default time to wait for the reader thread when disposing a session
pub const DEFAULT_DISPOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Possible errors on a controller session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Controller is disconnected")]
    Disconnected,
    #[error("Unable to encode output report: {0:?}")]
    Encode(PackingError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Unable to spawn reader thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Session lock poisoned")]
    Poisoned,
}

impl From<PackingError> for SessionError {
    fn from(value: PackingError) -> Self {
        SessionError::Encode(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connected => write!(f, "Connected"),
            SessionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Receives notifications from a session. Callbacks run synchronously on the
/// session's reader thread, after the state has been updated, so they must
/// not block for long.
pub trait SessionObserver: Send + Sync {
    /// Called with every non-empty set of changes decoded from a report
    fn on_input(&self, session: &SessionHandle, events: &[Event]);
    /// Called exactly once when the session disconnects
    fn on_disconnected(&self, session: &SessionHandle);
}

struct Shared {
    id: String,
    path: String,
    identity: ControllerIdentity,
    transport: Arc<dyn Transport>,
    kind: TransportKind,
    radio: Option<Arc<dyn BluetoothRadio>>,
    observers: Vec<Arc<dyn SessionObserver>>,
    state: Mutex<ControllerState>,
    /// Held while encoding and writing output reports
    output: Mutex<OutputState>,
    connected: AtomicBool,
    notified: AtomicBool,
    simple_mode_recovered: AtomicBool,
    /// Set once the first valid input report has been decoded
    received: Mutex<bool>,
    received_cond: Condvar,
}

/// Cloneable reference to a running controller session
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Unique identifier for the session (e.g. "hidraw0")
    pub fn id(&self) -> &str {
        self.shared.id.as_str()
    }

    /// Full path to the device (e.g. "/dev/hidraw0")
    pub fn path(&self) -> &str {
        self.shared.path.as_str()
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.shared.identity
    }

    pub fn transport(&self) -> TransportKind {
        self.shared.kind
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SessionStatus {
        if self.is_connected() {
            SessionStatus::Connected
        } else {
            SessionStatus::Disconnected
        }
    }

    /// Returns a copy of the current controller state
    pub fn state(&self) -> ControllerState {
        self.shared
            .state
            .lock()
            .map(|state| *state)
            .unwrap_or_default()
    }

    /// Returns a copy of the current output state
    pub fn output(&self) -> OutputState {
        self.shared
            .output
            .lock()
            .map(|output| *output)
            .unwrap_or_default()
    }

    pub fn battery(&self) -> BatteryState {
        self.state().battery
    }

    /// Block until the first input report has been decoded, the session
    /// disconnects or the timeout elapses. Returns whether a report arrived.
    pub fn wait_for_report(&self, timeout: Duration) -> bool {
        let Ok(received) = self.shared.received.lock() else {
            return false;
        };
        let result = self
            .shared
            .received_cond
            .wait_timeout_while(received, timeout, |received| {
                !*received && self.is_connected()
            });
        match result {
            Ok((received, _)) => *received,
            Err(_) => false,
        }
    }

    /// Set the lightbar color. This also switches the lightbar to the custom
    /// color behavior.
    pub fn set_lightbar(&self, r: u8, g: u8, b: u8) -> Result<(), SessionError> {
        log::debug!("Setting lightbar on {} to {}", self.id(), Rgb::new(r, g, b));
        self.update_output(|output| {
            output.lightbar = Rgb::new(r, g, b);
            output.lightbar_behavior = LightbarBehavior::CustomColor;
        })
    }

    pub fn set_lightbar_behavior(&self, behavior: LightbarBehavior) -> Result<(), SessionError> {
        self.update_output(|output| output.lightbar_behavior = behavior)
    }

    pub fn set_player_leds(
        &self,
        mask: u8,
        brightness: PlayerLedBrightness,
    ) -> Result<(), SessionError> {
        log::debug!("Setting player LEDs on {} to {mask:#07b}", self.id());
        self.update_output(|output| {
            output.player_leds = mask & PLAYER_LED_MASK;
            output.player_led_brightness = brightness;
        })
    }

    pub fn set_mic_led(&self, state: MicLed) -> Result<(), SessionError> {
        self.update_output(|output| output.mic_led = state)
    }

    /// Replace the whole output state, e.g. to restore a saved snapshot
    pub fn apply_output(&self, state: OutputState) -> Result<(), SessionError> {
        self.update_output(|output| *output = state)
    }

    /// Ask the Bluetooth radio to disconnect this controller. Returns false
    /// for USB sessions or if no peer could be disconnected.
    pub fn disconnect_bluetooth(&self) -> bool {
        if self.shared.kind != TransportKind::Bluetooth {
            return false;
        }
        let Some(address) = self.shared.identity.address.as_ref() else {
            log::debug!("No address known for {}, unable to disconnect", self.id());
            return false;
        };
        let Some(radio) = self.shared.radio.as_ref() else {
            return false;
        };
        match radio.disconnect(address) {
            Ok(disconnected) => disconnected,
            Err(e) => {
                log::warn!("Unable to disconnect {address}: {e}");
                false
            }
        }
    }

    /// Mutate the output state, then encode and write it while holding the
    /// write lock. A failed write disconnects the session.
    fn update_output<F>(&self, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut OutputState),
    {
        if !self.is_connected() {
            return Err(SessionError::Disconnected);
        }
        let mut output = self
            .shared
            .output
            .lock()
            .map_err(|_| SessionError::Poisoned)?;
        let mut next = *output;
        f(&mut next);
        self.write_output(&next)?;
        *output = next;

        Ok(())
    }

    fn write_output(&self, output: &OutputState) -> Result<(), SessionError> {
        let report = codec::encode(output, self.shared.kind)?;
        log::trace!("Writing output report to {}: {report:02x?}", self.id());
        if let Err(e) = self.shared.transport.write(&report) {
            log::warn!("Failed to write output report to {}: {e}", self.id());
            self.mark_disconnected();
            return Err(e.into());
        }
        Ok(())
    }

    /// Resend the current output state
    fn write_current(&self) -> Result<(), SessionError> {
        let output = self
            .shared
            .output
            .lock()
            .map_err(|_| SessionError::Poisoned)?;
        self.write_output(&output)
    }

    /// Transition to disconnected and close the transport, unblocking the
    /// reader. Idempotent.
    fn mark_disconnected(&self) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            log::debug!("Session {} marked disconnected", self.id());
        }
        self.shared.transport.close();
        // Wake anyone waiting for a first report
        if let Ok(_received) = self.shared.received.lock() {
            self.shared.received_cond.notify_all();
        }
    }

    /// Fire the disconnected notification if it has not been fired yet
    fn notify_disconnected(&self) {
        if self.shared.notified.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Controller disconnected: {}", self.shared.identity);
        for observer in self.shared.observers.iter() {
            observer.on_disconnected(self);
        }
    }

    /// Decode the given report and notify observers of any changes
    fn handle_report(&self, buf: &[u8]) {
        let new_state = match codec::decode(buf, self.shared.kind) {
            Ok(state) => state,
            Err(RejectReason::SimpleMode) => {
                self.recover_simple_mode();
                return;
            }
            Err(reason) => {
                log::trace!("Rejected report from {}: {reason}", self.id());
                return;
            }
        };

        let old_state = {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };
            let old_state = *state;
            *state = new_state;
            old_state
        };
        if let Ok(mut received) = self.shared.received.lock() {
            if !*received {
                *received = true;
                self.shared.received_cond.notify_all();
            }
        }

        let events = translate(&old_state, &new_state);
        if events.is_empty() {
            return;
        }
        for observer in self.shared.observers.iter() {
            observer.on_input(self, &events);
        }
    }

    /// Any output report switches a Bluetooth controller out of the simple
    /// report mode. Only attempted once per session.
    fn recover_simple_mode(&self) {
        if self.shared.simple_mode_recovered.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!(
            "Controller {} is in simple mode, sending output report",
            self.id()
        );
        if let Err(e) = self.write_current() {
            log::warn!("Unable to switch {} to full reports: {e}", self.id());
        }
    }

    /// Blocking read loop run on the session's reader thread
    fn read_loop(&self) {
        let mut buf = [0u8; INPUT_REPORT_BT_SIZE];
        loop {
            match self.shared.transport.read(&mut buf) {
                Ok(0) => {
                    if self.is_connected() {
                        log::info!("Controller {} stopped sending reports", self.id());
                    }
                    break;
                }
                Ok(bytes_read) => self.handle_report(&buf[..bytes_read]),
                Err(e) if e.is_device_gone() => {
                    log::info!("Controller {} is gone: {e}", self.id());
                    break;
                }
                Err(e) => {
                    log::error!("Error reading from controller {}: {e:?}", self.id());
                    break;
                }
            }
        }
        self.mark_disconnected();
        self.notify_disconnected();
    }
}

struct Reader {
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// Owns a single open controller and its background reader. Dropping the
/// session disposes it.
pub struct ControllerSession {
    handle: SessionHandle,
    reader: Mutex<Option<Reader>>,
    reader_thread: Mutex<Option<ThreadId>>,
    disposed: AtomicBool,
    dispose_timeout: Duration,
}

impl ControllerSession {
    pub fn new(
        device: &DeviceDescriptor,
        transport: Arc<dyn Transport>,
        identity: ControllerIdentity,
        observers: Vec<Arc<dyn SessionObserver>>,
        radio: Option<Arc<dyn BluetoothRadio>>,
        dispose_timeout: Duration,
    ) -> Self {
        let id = device
            .path
            .rsplit('/')
            .next()
            .unwrap_or(device.path.as_str())
            .to_string();
        let shared = Shared {
            id,
            path: device.path.clone(),
            identity,
            kind: transport.kind(),
            transport,
            radio,
            observers,
            state: Mutex::new(ControllerState::default()),
            output: Mutex::new(OutputState::default()),
            connected: AtomicBool::new(true),
            notified: AtomicBool::new(false),
            simple_mode_recovered: AtomicBool::new(false),
            received: Mutex::new(false),
            received_cond: Condvar::new(),
        };

        Self {
            handle: SessionHandle {
                shared: Arc::new(shared),
            },
            reader: Mutex::new(None),
            reader_thread: Mutex::new(None),
            disposed: AtomicBool::new(false),
            dispose_timeout,
        }
    }

    /// Returns a cloneable handle to this session
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Spawn the background reader thread
    pub fn start(&self) -> Result<(), SessionError> {
        let mut reader = self.reader.lock().map_err(|_| SessionError::Poisoned)?;
        if reader.is_some() || self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (done_tx, done_rx) = mpsc::channel();
        let handle = self.handle.clone();
        let thread = thread::Builder::new()
            .name(format!("ds-reader-{}", self.handle.id()))
            .spawn(move || {
                handle.read_loop();
                let _ = done_tx.send(());
            })?;

        if let Ok(mut id) = self.reader_thread.lock() {
            *id = Some(thread.thread().id());
        }
        *reader = Some(Reader {
            thread,
            done: done_rx,
        });
        log::debug!("Started reader for {}", self.handle.id());

        Ok(())
    }

    /// Stop the session. Closes the transport, waits a bounded time for the
    /// reader to exit, and fires the disconnected notification if the reader
    /// did not. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("Disposing session {}", self.handle.id());
        self.handle.mark_disconnected();

        let reader = self.reader.lock().ok().and_then(|mut r| r.take());
        let Some(reader) = reader else {
            self.handle.notify_disconnected();
            return;
        };

        // Waiting on ourselves would only burn the timeout
        let on_reader_thread = self
            .reader_thread
            .lock()
            .ok()
            .and_then(|id| *id)
            .is_some_and(|id| id == thread::current().id());
        if on_reader_thread {
            return;
        }

        match reader.done.recv_timeout(self.dispose_timeout) {
            Ok(_) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if reader.thread.join().is_err() {
                    log::error!("Reader thread for {} panicked", self.handle.id());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Reader for {} did not stop within {:?}",
                    self.handle.id(),
                    self.dispose_timeout
                );
            }
        }
        self.handle.notify_disconnected();
    }
}

impl Deref for ControllerSession {
    type Target = SessionHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for ControllerSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
