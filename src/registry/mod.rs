
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::{
    config::{DeviceMatch, Settings},
    drivers::dualsense::event::Event,
    identity::{BluetoothRadio, ControllerIdentity, IdentityResolver},
    session::{ControllerSession, SessionError, SessionHandle, SessionObserver},
    special_action::{
        profile::{ProfileError, ProfileStore},
        SpecialActionEngine,
    },
    transport::{DeviceDescriptor, DeviceProvider, TransportError, TransportKind},
    watcher::{self, WatchEvent},
};

/// Size of the broadcast buffer for [ControllerEvent]
const EVENT_BUFFER_SIZE: usize = 2048;
/// Directory watched for hidraw hotplug
const DEV_PATH: &str = "/dev";
/// Prefix of hidraw device nodes
const HIDRAW_PREFIX: &str = "hidraw";
/// Interval for releasing stale special action button state
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_millis(250);
/// Time to let udev apply permissions to new device nodes before scanning
const HOTPLUG_SETTLE: Duration = Duration::from_millis(200);

/// Possible errors from the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("No controller found with id: {0}")]
    NotFound(String),
    #[error("Registry lock poisoned")]
    Poisoned,
    #[error("Registry is already running")]
    AlreadyRunning,
}

/// Events sent to collaborators of the registry
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Connected {
        id: String,
        identity: ControllerIdentity,
        transport: TransportKind,
    },
    Disconnected {
        id: String,
        identity: ControllerIdentity,
    },
    Input {
        id: String,
        events: Vec<Event>,
    },
}

/// Forwards session notifications for one tracked session to the registry's
/// channels
struct SessionForwarder {
    /// Set once Connected was announced, cleared when Disconnected is
    announced: Arc<AtomicBool>,
    tx: broadcast::Sender<ControllerEvent>,
    rescan_tx: mpsc::UnboundedSender<()>,
}

impl SessionObserver for SessionForwarder {
    fn on_input(&self, session: &SessionHandle, events: &[Event]) {
        if !self.announced.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(ControllerEvent::Input {
            id: session.id().to_string(),
            events: events.to_vec(),
        });
    }

    fn on_disconnected(&self, session: &SessionHandle) {
        if !self.announced.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(ControllerEvent::Disconnected {
            id: session.id().to_string(),
            identity: session.identity().clone(),
        });
        // The session went away on its own, look for what replaced it
        let _ = self.rescan_tx.send(());
    }
}

struct TrackedSession {
    session: ControllerSession,
    announced: Arc<AtomicBool>,
}

#[derive(Default)]
struct Tracked {
    sessions: Vec<TrackedSession>,
    /// Device paths discarded as duplicates of a tracked controller
    ignored: HashSet<String>,
}

/// Discovers controllers and owns one [ControllerSession] per physical
/// controller.
pub struct ConnectionRegistry {
    provider: Arc<dyn DeviceProvider>,
    resolver: IdentityResolver,
    radio: Option<Arc<dyn BluetoothRadio>>,
    device_match: DeviceMatch,
    dispose_timeout: Duration,
    engine: Arc<SpecialActionEngine>,
    profiles: Arc<ProfileStore>,
    tracked: Mutex<Tracked>,
    tx: broadcast::Sender<ControllerEvent>,
    rescan_tx: mpsc::UnboundedSender<()>,
    rescan_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
}

impl ConnectionRegistry {
    pub fn new(
        settings: &Settings,
        provider: Arc<dyn DeviceProvider>,
        radio: Option<Arc<dyn BluetoothRadio>>,
        engine: Arc<SpecialActionEngine>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let (rescan_tx, rescan_rx) = mpsc::unbounded_channel();
        Self {
            provider,
            resolver: IdentityResolver::new(radio.clone()),
            radio,
            device_match: settings.device.clone(),
            dispose_timeout: settings.session.dispose_timeout(),
            engine,
            profiles,
            tracked: Mutex::new(Tracked::default()),
            tx,
            rescan_tx,
            rescan_rx: Mutex::new(Some(rescan_rx)),
        }
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Returns the special action engine fed by this registry's sessions
    pub fn engine(&self) -> Arc<SpecialActionEngine> {
        self.engine.clone()
    }

    /// Returns handles to all tracked sessions
    pub fn sessions(&self) -> Vec<SessionHandle> {
        let Ok(tracked) = self.tracked.lock() else {
            return Vec::new();
        };
        tracked
            .sessions
            .iter()
            .map(|tracked| tracked.session.handle())
            .collect()
    }

    /// Find a tracked session by id (e.g. "hidraw0"), device path or
    /// controller address
    pub fn find(&self, id: &str) -> Option<SessionHandle> {
        let wanted = crate::identity::normalize(id);
        self.sessions().into_iter().find(|session| {
            session.id() == id
                || session.path() == id
                || session
                    .identity()
                    .address
                    .as_deref()
                    .is_some_and(|address| crate::identity::normalize(address) == wanted)
        })
    }

    /// Swap the special action profile of a tracked controller
    pub fn set_profile(&self, id: &str, profile: &str) -> Result<(), RegistryError> {
        let session = self
            .find(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.profiles.assign(&session.identity().key(), profile)?;
        self.engine.profile_changed(session.id());
        Ok(())
    }

    fn announce_connected(&self, tracked: &TrackedSession) {
        tracked.announced.store(true, Ordering::SeqCst);
        let handle = tracked.session.handle();
        log::info!("Controller connected: {}", handle.identity());
        let _ = self.tx.send(ControllerEvent::Connected {
            id: handle.id().to_string(),
            identity: handle.identity().clone(),
            transport: handle.transport(),
        });
    }

    fn announce_disconnected(&self, tracked: &TrackedSession) {
        if !tracked.announced.swap(false, Ordering::SeqCst) {
            return;
        }
        let handle = tracked.session.handle();
        let _ = self.tx.send(ControllerEvent::Disconnected {
            id: handle.id().to_string(),
            identity: handle.identity().clone(),
        });
    }

    /// Stop tracking the given session, firing Disconnected if it was
    /// announced
    fn remove(&self, tracked: TrackedSession) {
        self.announce_disconnected(&tracked);
        self.engine.remove_device(tracked.session.id());
        tracked.session.dispose();
    }

    /// Open the given device and create a session for it. The reader is not
    /// started yet.
    fn open(&self, device: &DeviceDescriptor) -> Result<TrackedSession, RegistryError> {
        let transport = self.provider.open(device)?;
        let identity = self.resolver.resolve(device, transport.as_ref());
        let announced = Arc::new(AtomicBool::new(false));
        let forwarder = SessionForwarder {
            announced: announced.clone(),
            tx: self.tx.clone(),
            rescan_tx: self.rescan_tx.clone(),
        };
        let engine: Arc<dyn SessionObserver> = self.engine.clone();
        let forwarder: Arc<dyn SessionObserver> = Arc::new(forwarder);
        let session = ControllerSession::new(
            device,
            transport,
            identity,
            vec![engine, forwarder],
            self.radio.clone(),
            self.dispose_timeout,
        );

        Ok(TrackedSession { session, announced })
    }

    /// Enumerate devices, dropping sessions for devices that went away and
    /// adding sessions for new ones. The same controller seen over USB and
    /// Bluetooth is only tracked once, preferring USB.
    pub fn scan(&self) -> Result<(), RegistryError> {
        let mut tracked = self.tracked.lock().map_err(|_| RegistryError::Poisoned)?;

        let devices: Vec<DeviceDescriptor> = self
            .provider
            .enumerate()?
            .into_iter()
            .filter(|device| {
                self.device_match
                    .matches(device.vendor_id, device.product_id)
            })
            .collect();
        let present: HashSet<&str> = devices.iter().map(|d| d.path.as_str()).collect();
        log::debug!("Found {} matching HID device(s)", devices.len());

        // Remove sessions for devices that are gone or already disconnected
        let (keep, gone): (Vec<TrackedSession>, Vec<TrackedSession>) =
            std::mem::take(&mut tracked.sessions)
                .into_iter()
                .partition(|t| t.session.is_connected() && present.contains(t.session.path()));
        tracked.sessions = keep;
        let removed_any = !gone.is_empty();
        for session in gone {
            log::debug!("Removing session {}", session.session.id());
            self.remove(session);
        }

        // A removed controller may have been hiding a duplicate
        if removed_any {
            tracked.ignored.clear();
        } else {
            tracked.ignored.retain(|path| present.contains(path.as_str()));
        }

        for device in devices.iter() {
            let is_tracked = tracked
                .sessions
                .iter()
                .any(|t| t.session.path() == device.path);
            if is_tracked || tracked.ignored.contains(&device.path) {
                continue;
            }

            let new = match self.open(device) {
                Ok(new) => new,
                Err(e) => {
                    log::warn!("Unable to open {}: {e}", device.path);
                    continue;
                }
            };
            self.add(&mut tracked, new);
        }

        Ok(())
    }

    /// Add a new session, applying the duplicate policy against the tracked
    /// sessions
    fn add(&self, tracked: &mut Tracked, new: TrackedSession) {
        let existing = tracked
            .sessions
            .iter()
            .position(|t| t.session.identity().matches(new.session.identity()));

        if let Some(index) = existing {
            let existing_kind = tracked.sessions[index].session.transport();
            match (new.session.transport(), existing_kind) {
                (TransportKind::Usb, TransportKind::Bluetooth) => {
                    log::info!(
                        "Controller {} connected over USB, replacing Bluetooth session",
                        new.session.identity()
                    );
                    let old = tracked.sessions.remove(index);
                    if !old.session.disconnect_bluetooth() {
                        log::debug!("Bluetooth disconnect of {} failed", old.session.id());
                    }
                    tracked.ignored.insert(old.session.path().to_string());
                    self.remove(old);
                }
                (TransportKind::Bluetooth, TransportKind::Usb) => {
                    log::debug!(
                        "Ignoring Bluetooth connection of {}, already connected over USB",
                        new.session.identity()
                    );
                    tracked.ignored.insert(new.session.path().to_string());
                    new.session.dispose();
                    return;
                }
                _ => {
                    log::warn!(
                        "Controller {} is already connected as {}, discarding {}",
                        new.session.identity(),
                        tracked.sessions[index].session.path(),
                        new.session.path()
                    );
                    tracked.ignored.insert(new.session.path().to_string());
                    new.session.dispose();
                    return;
                }
            }
        }

        self.announce_connected(&new);
        if let Err(e) = new.session.start() {
            log::error!("Unable to start session {}: {e}", new.session.id());
            self.remove(new);
            return;
        }
        tracked.sessions.push(new);
    }

    /// Dispose every session
    pub fn shutdown(&self) {
        let sessions = match self.tracked.lock() {
            Ok(mut tracked) => {
                tracked.ignored.clear();
                std::mem::take(&mut tracked.sessions)
            }
            Err(_) => return,
        };
        log::info!("Shutting down {} session(s)", sessions.len());
        for session in sessions {
            self.remove(session);
        }
    }

    /// Run the registry until ctrl-c. Rescans on hidraw hotplug and whenever
    /// a session goes away, and periodically releases stale button state.
    pub async fn run(self: Arc<Self>) -> Result<(), RegistryError> {
        let mut rescan_rx = self
            .rescan_rx
            .lock()
            .map_err(|_| RegistryError::Poisoned)?
            .take()
            .ok_or(RegistryError::AlreadyRunning)?;

        // Watch for hidraw hotplug on a detached thread so a blocked inotify
        // read never holds up runtime shutdown
        let (watch_tx, mut watch_rx) = mpsc::channel(64);
        if let Err(e) = watcher::spawn(DEV_PATH.to_string(), watch_tx) {
            log::error!("Unable to watch {DEV_PATH}: {e}");
        }

        self.rescan().await;

        let mut sweep = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                Some(event) = watch_rx.recv() => {
                    let name = match &event {
                        WatchEvent::Create { name, .. } | WatchEvent::Delete { name, .. } => name,
                    };
                    if !name.starts_with(HIDRAW_PREFIX) {
                        continue;
                    }
                    log::debug!("Got hidraw hotplug event: {event:?}");
                    if matches!(event, WatchEvent::Create { .. }) {
                        tokio::time::sleep(HOTPLUG_SETTLE).await;
                    }
                    self.rescan().await;
                }
                Some(_) = rescan_rx.recv() => {
                    self.rescan().await;
                }
                _ = sweep.tick() => {
                    self.engine.expire_idle(Instant::now());
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received interrupt, shutting down");
                    break;
                }
            }
        }

        let registry = self.clone();
        let _ = tokio::task::spawn_blocking(move || registry.shutdown()).await;

        Ok(())
    }

    /// Scan on the blocking thread pool
    async fn rescan(self: &Arc<Self>) {
        let registry = self.clone();
        let result = tokio::task::spawn_blocking(move || registry.scan()).await;
        match result {
            Ok(Ok(())) => (),
            Ok(Err(e)) => log::error!("Unable to scan for controllers: {e}"),
            Err(e) => log::error!("Scan task failed: {e}"),
        }
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
