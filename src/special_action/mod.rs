pub mod handlers;
pub mod profile;

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    drivers::dualsense::{
        event::{ButtonEvent, Event},
        state::{BatteryState, Button, OutputState, PlayerLedBrightness},
    },
    session::{SessionError, SessionHandle, SessionObserver},
};

use self::handlers::HandlerTable;

/// Time without any button transition after which a device's buttons are
/// considered released
pub const DEFAULT_COMBINATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of the broadcast buffer for [SpecialActionEvent]
const EVENT_BUFFER_SIZE: usize = 64;

/// Set of buttons that must all be held to trigger an action. An empty
/// combination never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Button>", into = "Vec<Button>")]
pub struct ButtonCombination(BTreeSet<Button>);

impl ButtonCombination {
    pub fn new(buttons: &[Button]) -> Self {
        Self(buttons.iter().copied().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if every button of the combination is in the given set
    pub fn is_held(&self, pressed: &BTreeSet<Button>) -> bool {
        !self.is_empty() && self.0.is_subset(pressed)
    }
}

impl From<Vec<Button>> for ButtonCombination {
    fn from(value: Vec<Button>) -> Self {
        Self(value.into_iter().collect())
    }
}

impl From<ButtonCombination> for Vec<Button> {
    fn from(value: ButtonCombination) -> Self {
        value.0.into_iter().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryIndicatorStyle {
    Lightbar,
    PlayerLeds,
}

/// What an action does once its combination is held
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    BatteryIndicator { style: BatteryIndicatorStyle },
    DisconnectController,
    Custom { handler: String },
}

/// A user configured button combination and the action it triggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialAction {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub combination: ButtonCombination,
    pub action: ActionKind,
}

impl Display for SpecialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or(self.id.as_str()))
    }
}

/// Events emitted by the [SpecialActionEngine]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialActionEvent {
    Triggered { device: String, action_id: String },
}

/// The controller an action runs against
pub trait ActionTarget: Send + Sync {
    /// Unique identifier of the device
    fn device_id(&self) -> String;
    /// Key used to look up the device's profile
    fn profile_key(&self) -> String;
    fn output_state(&self) -> OutputState;
    fn apply_output(&self, state: OutputState) -> Result<(), SessionError>;
    fn set_lightbar(&self, r: u8, g: u8, b: u8) -> Result<(), SessionError>;
    fn set_player_leds(&self, mask: u8, brightness: PlayerLedBrightness)
        -> Result<(), SessionError>;
    fn battery(&self) -> BatteryState;
    fn disconnect_bluetooth(&self) -> bool;
}

impl ActionTarget for SessionHandle {
    fn device_id(&self) -> String {
        self.id().to_string()
    }

    fn profile_key(&self) -> String {
        self.identity().key()
    }

    fn output_state(&self) -> OutputState {
        self.output()
    }

    fn apply_output(&self, state: OutputState) -> Result<(), SessionError> {
        SessionHandle::apply_output(self, state)
    }

    fn set_lightbar(&self, r: u8, g: u8, b: u8) -> Result<(), SessionError> {
        SessionHandle::set_lightbar(self, r, g, b)
    }

    fn set_player_leds(
        &self,
        mask: u8,
        brightness: PlayerLedBrightness,
    ) -> Result<(), SessionError> {
        SessionHandle::set_player_leds(self, mask, brightness)
    }

    fn battery(&self) -> BatteryState {
        SessionHandle::battery(self)
    }

    fn disconnect_bluetooth(&self) -> bool {
        SessionHandle::disconnect_bluetooth(self)
    }
}

/// Provides the special actions configured for a controller
pub trait ActionLookup: Send + Sync {
    fn actions_for(&self, profile_key: &str) -> Vec<SpecialAction>;
}

/// Button tracking for a single device
struct DeviceButtons {
    pressed: BTreeSet<Button>,
    last_update: Option<Instant>,
    /// Id of the action currently holding the LEDs
    active: Option<String>,
    /// Output state from before the active action was triggered
    saved: Option<OutputState>,
    target: Arc<dyn ActionTarget>,
}

impl DeviceButtons {
    fn new(target: Arc<dyn ActionTarget>) -> Self {
        Self {
            pressed: BTreeSet::new(),
            last_update: None,
            active: None,
            saved: None,
            target,
        }
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        self.last_update
            .is_some_and(|last| now.saturating_duration_since(last) > timeout)
    }

    /// Restore the LED state saved before the active action and clear it
    fn restore(&mut self) {
        let Some(action_id) = self.active.take() else {
            return;
        };
        let Some(saved) = self.saved.take() else {
            return;
        };
        log::debug!(
            "Restoring output state on {} after {action_id}",
            self.target.device_id()
        );
        if let Err(e) = self.target.apply_output(saved) {
            log::warn!(
                "Unable to restore output state on {}: {e}",
                self.target.device_id()
            );
        }
    }

    /// Release all buttons, restoring any active action
    fn reset(&mut self) {
        self.pressed.clear();
        self.restore();
    }
}

/// Recognizes held button combinations on each controller and runs the
/// matching special action.
pub struct SpecialActionEngine {
    lookup: Arc<dyn ActionLookup>,
    handlers: HandlerTable,
    timeout: Duration,
    devices: Mutex<HashMap<String, Arc<Mutex<DeviceButtons>>>>,
    tx: broadcast::Sender<SpecialActionEvent>,
}

impl SpecialActionEngine {
    pub fn new(lookup: Arc<dyn ActionLookup>, handlers: HandlerTable, timeout: Duration) -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            lookup,
            handlers,
            timeout,
            devices: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Subscribe to triggered actions
    pub fn subscribe(&self) -> broadcast::Receiver<SpecialActionEvent> {
        self.tx.subscribe()
    }

    fn device(&self, target: &Arc<dyn ActionTarget>) -> Option<Arc<Mutex<DeviceButtons>>> {
        let mut devices = self.devices.lock().ok()?;
        let entry = devices
            .entry(target.device_id())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceButtons::new(target.clone()))));
        Some(entry.clone())
    }

    /// Apply a single button transition for the given device
    pub fn on_button(
        &self,
        target: Arc<dyn ActionTarget>,
        button: Button,
        pressed: bool,
        now: Instant,
    ) {
        self.on_buttons(target, &[(button, pressed)], now);
    }

    /// Apply every button transition decoded from one report. Combinations
    /// are evaluated once, after all transitions are applied, so buttons
    /// pressed together only trigger the longest matching action.
    pub fn on_buttons(
        &self,
        target: Arc<dyn ActionTarget>,
        changes: &[(Button, bool)],
        now: Instant,
    ) {
        if changes.is_empty() {
            return;
        }
        let Some(device) = self.device(&target) else {
            return;
        };
        let Ok(mut device) = device.lock() else {
            return;
        };

        if device.is_expired(now, self.timeout) {
            log::trace!("Button state on {} timed out", target.device_id());
            device.reset();
        }
        device.last_update = Some(now);

        let mut released = false;
        let mut any_pressed = false;
        for (button, pressed) in changes.iter().copied() {
            if pressed {
                device.pressed.insert(button);
                any_pressed = true;
            } else {
                device.pressed.remove(&button);
                released = true;
            }
        }

        // Releasing any button ends the active window
        if released {
            device.restore();
        }
        if !any_pressed {
            return;
        }

        let mut actions = self.lookup.actions_for(&target.profile_key());
        actions.sort_by(|a, b| b.combination.len().cmp(&a.combination.len()));
        let Some(action) = actions
            .into_iter()
            .find(|action| action.combination.is_held(&device.pressed))
        else {
            return;
        };

        if device.active.is_none() {
            device.saved = Some(target.output_state());
        }
        device.active = Some(action.id.clone());

        log::info!("Triggering {action} on {}", target.device_id());
        if let Err(e) = self.handlers.dispatch(target.as_ref(), &action) {
            log::warn!("Special action {} failed: {e}", action.id);
        }
        let _ = self.tx.send(SpecialActionEvent::Triggered {
            device: target.device_id(),
            action_id: action.id,
        });
    }

    /// Forget the button state of a device whose profile was swapped. The
    /// current lighting is kept as is.
    pub fn profile_changed(&self, device_id: &str) {
        let device = self
            .devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(device_id).cloned());
        let Some(device) = device else {
            return;
        };
        if let Ok(mut device) = device.lock() {
            device.pressed.clear();
            device.active = None;
            device.saved = None;
            device.last_update = None;
        };
    }

    /// Reset every device that has not seen a transition within the timeout
    pub fn expire_idle(&self, now: Instant) {
        let devices: Vec<Arc<Mutex<DeviceButtons>>> = match self.devices.lock() {
            Ok(devices) => devices.values().cloned().collect(),
            Err(_) => return,
        };
        for device in devices {
            let Ok(mut device) = device.lock() else {
                continue;
            };
            let idle = !device.pressed.is_empty() || device.active.is_some();
            if idle && device.is_expired(now, self.timeout) {
                log::trace!("Expiring button state on {}", device.target.device_id());
                device.reset();
            }
        }
    }

    /// Stop tracking the given device
    pub fn remove_device(&self, device_id: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.remove(device_id);
        }
    }

    /// Returns the buttons currently held on the given device
    pub fn pressed(&self, device_id: &str) -> Vec<Button> {
        let device = self
            .devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(device_id).cloned());
        device
            .and_then(|device| device.lock().ok().map(|d| d.pressed.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Returns the id of the action currently active on the given device
    pub fn active_action(&self, device_id: &str) -> Option<String> {
        let device = self
            .devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(device_id).cloned())?;
        let device = device.lock().ok()?;
        device.active.clone()
    }
}

impl SessionObserver for SpecialActionEngine {
    fn on_input(&self, session: &SessionHandle, events: &[Event]) {
        let changes: Vec<(Button, bool)> = events
            .iter()
            .filter_map(|event| match event {
                Event::Button(ButtonEvent { button, pressed }) => Some((*button, *pressed)),
                _ => None,
            })
            .collect();
        if changes.is_empty() {
            return;
        }
        let target: Arc<dyn ActionTarget> = Arc::new(session.clone());
        self.on_buttons(target, &changes, Instant::now());
    }

    fn on_disconnected(&self, session: &SessionHandle) {
        self.remove_device(session.id());
    }
}
