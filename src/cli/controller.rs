use std::{
    error::Error,
    time::{Duration, Instant},
};

use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};

use crate::{
    drivers::dualsense::state::{MicLed, PlayerLedBrightness},
    registry::{ConnectionRegistry, RegistryError},
    session::SessionHandle,
    transport::TransportKind,
};

type CommandError = Box<dyn Error + Send + Sync>;

/// How long `list` waits for controllers to send their first input report
const REPORT_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum ControllerCommand {
    List,
    Lightbar {
        r: u8,
        g: u8,
        b: u8,
        device: Option<String>,
    },
    PlayerLeds {
        mask: u8,
        brightness: PlayerLedBrightness,
        device: Option<String>,
    },
    MicLed {
        state: MicLed,
        device: Option<String>,
    },
    Disconnect {
        device: Option<String>,
    },
}

#[derive(Tabled)]
pub(crate) struct ControllerRow {
    id: String,
    address: String,
    transport: String,
    source: String,
    battery: String,
    status: String,
}

impl ControllerRow {
    /// Battery is only known once the controller has sent a report
    pub(crate) fn new(session: &SessionHandle, reported: bool) -> Self {
        let identity = session.identity();
        let battery = session.battery();
        let battery_text = if !reported {
            "unknown".to_string()
        } else if battery.fully_charged {
            format!("{:.0}% (full)", battery.level)
        } else if battery.charging {
            format!("{:.0}% (charging)", battery.level)
        } else {
            format!("{:.0}%", battery.level)
        };

        Self {
            id: session.id().to_string(),
            address: identity.address.clone().unwrap_or_else(|| "-".to_string()),
            transport: session.transport().to_string(),
            source: identity
                .source
                .map(|source| source.to_string())
                .unwrap_or_else(|| "device path".to_string()),
            battery: battery_text,
            status: session.status().to_string(),
        }
    }
}

/// Returns the sessions the command applies to
fn select(
    registry: &ConnectionRegistry,
    device: Option<&str>,
) -> Result<Vec<SessionHandle>, CommandError> {
    let sessions = match device {
        Some(id) => vec![registry
            .find(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?],
        None => registry.sessions(),
    };
    if sessions.is_empty() {
        return Err("No controllers found".into());
    }
    Ok(sessions)
}

/// Scan for controllers and run the given command against them
pub fn handle_controller(
    registry: &ConnectionRegistry,
    cmd: ControllerCommand,
) -> Result<(), CommandError> {
    registry.scan()?;

    match cmd {
        ControllerCommand::List => {
            let sessions = registry.sessions();
            let count = sessions.len();
            let deadline = Instant::now() + REPORT_WAIT;
            let rows: Vec<ControllerRow> = sessions
                .iter()
                .map(|session| {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    ControllerRow::new(session, session.wait_for_report(remaining))
                })
                .collect();

            let mut table = Table::new(rows);
            table
                .with(Style::modern_rounded())
                .with(Panel::header("Controllers"));
            println!("{table}");
            println!("Found {count} controller(s)");
        }
        ControllerCommand::Lightbar { r, g, b, device } => {
            for session in select(registry, device.as_deref())? {
                session.set_lightbar(r, g, b)?;
                println!("{}: lightbar set to ({r}, {g}, {b})", session.id());
            }
        }
        ControllerCommand::PlayerLeds {
            mask,
            brightness,
            device,
        } => {
            for session in select(registry, device.as_deref())? {
                session.set_player_leds(mask, brightness)?;
                println!("{}: player LEDs set to {mask:#07b}", session.id());
            }
        }
        ControllerCommand::MicLed { state, device } => {
            for session in select(registry, device.as_deref())? {
                session.set_mic_led(state)?;
                println!("{}: mic LED set to {state:?}", session.id());
            }
        }
        ControllerCommand::Disconnect { device } => {
            for session in select(registry, device.as_deref())? {
                if session.transport() != TransportKind::Bluetooth {
                    println!("{}: not connected over Bluetooth", session.id());
                    continue;
                }
                if session.disconnect_bluetooth() {
                    println!("{}: disconnected", session.id());
                } else {
                    println!("{}: unable to disconnect", session.id());
                }
            }
        }
    }

    Ok(())
}
