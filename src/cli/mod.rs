pub mod controller;


use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};

use crate::{
    config::Settings,
    drivers::dualsense::state::{MicLed, PlayerLedBrightness},
    identity::{bluez::BlueZRadio, BluetoothRadio},
    registry::{ConnectionRegistry, ControllerEvent},
    special_action::{
        handlers::HandlerTable, profile::ProfileStore, SpecialActionEngine, SpecialActionEvent,
    },
    transport::hidraw::HidProvider,
};

use controller::{handle_controller, ControllerCommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a settings file to use instead of the default search path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage connected controllers until interrupted (default)
    Run,
    /// List connected controllers
    List,
    /// Set the lightbar color
    Lightbar {
        r: u8,
        g: u8,
        b: u8,
        /// Controller id (e.g. "hidraw3") or address. Defaults to all.
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Set the player indicator LEDs from a 5-bit mask (e.g. 0b00100)
    PlayerLeds {
        #[arg(value_parser = parse_mask)]
        mask: u8,
        #[arg(short, long, default_value = "high")]
        brightness: PlayerLedBrightness,
        /// Controller id (e.g. "hidraw3") or address. Defaults to all.
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Set the microphone LED (off, on or pulse)
    MicLed {
        state: MicLed,
        /// Controller id (e.g. "hidraw3") or address. Defaults to all.
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Turn off Bluetooth controllers
    Disconnect {
        /// Controller id (e.g. "hidraw3") or address. Defaults to all.
        device: Option<String>,
    },
}

/// Parse a LED mask given in decimal, hex (0x) or binary (0b)
fn parse_mask(value: &str) -> Result<u8, String> {
    let result = if let Some(bin) = value.strip_prefix("0b") {
        u8::from_str_radix(bin, 2)
    } else if let Some(hex) = value.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        value.parse::<u8>()
    };
    result.map_err(|e| format!("Invalid LED mask '{value}': {e}"))
}

/// Load settings from the given path or the default search path
pub fn load_settings(path: Option<&PathBuf>) -> Result<Settings, Box<dyn Error>> {
    let settings = match path {
        Some(path) => {
            log::info!("Loading settings from {path:?}");
            Settings::from_yaml_file(path)?
        }
        None => Settings::load()?,
    };
    Ok(settings)
}

/// Build a registry backed by hidraw and BlueZ
fn new_registry(settings: &Settings) -> Result<Arc<ConnectionRegistry>, Box<dyn Error>> {
    let provider = Arc::new(HidProvider::new()?);
    let radio: Option<Arc<dyn BluetoothRadio>> = match BlueZRadio::new() {
        Ok(radio) => Some(Arc::new(radio)),
        Err(e) => {
            log::warn!("Bluetooth radio unavailable, addresses will come from the device: {e}");
            None
        }
    };
    let profiles = Arc::new(ProfileStore::new(settings));
    let engine = Arc::new(SpecialActionEngine::new(
        profiles.clone(),
        HandlerTable::default(),
        settings.special_actions.combination_timeout(),
    ));
    let registry = ConnectionRegistry::new(settings, provider, radio, engine, profiles);

    Ok(Arc::new(registry))
}

/// Run the controller manager until interrupted
pub async fn run(settings: Settings) -> Result<(), Box<dyn Error>> {
    let registry = new_registry(&settings)?;

    // Log what happens to controllers
    let mut controller_rx = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match controller_rx.recv().await {
                Ok(ControllerEvent::Connected {
                    id,
                    identity,
                    transport,
                }) => log::info!("{id}: {identity} connected over {transport}"),
                Ok(ControllerEvent::Disconnected { id, identity }) => {
                    log::info!("{id}: {identity} disconnected")
                }
                Ok(ControllerEvent::Input { id, events }) => {
                    log::trace!("{id}: {events:?}")
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                    log::debug!("Controller event log lagged by {count} event(s)")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let mut action_rx = registry.engine().subscribe();
    tokio::spawn(async move {
        while let Ok(SpecialActionEvent::Triggered { device, action_id }) = action_rx.recv().await
        {
            log::info!("{device}: triggered special action '{action_id}'");
        }
    });

    registry.run().await?;
    Ok(())
}

/// Handle a one-shot command against the currently connected controllers
pub async fn main_cli(settings: Settings, cmd: Commands) -> Result<(), Box<dyn Error>> {
    let cmd = match cmd {
        Commands::Run => return run(settings).await,
        Commands::List => ControllerCommand::List,
        Commands::Lightbar { r, g, b, device } => ControllerCommand::Lightbar { r, g, b, device },
        Commands::PlayerLeds {
            mask,
            brightness,
            device,
        } => ControllerCommand::PlayerLeds {
            mask,
            brightness,
            device,
        },
        Commands::MicLed { state, device } => ControllerCommand::MicLed { state, device },
        Commands::Disconnect { device } => ControllerCommand::Disconnect { device },
    };

    // Device I/O is blocking
    let registry = new_registry(&settings)?;
    let result = tokio::task::spawn_blocking(move || {
        let result = handle_controller(&registry, cmd);
        registry.shutdown();
        result
    })
    .await?;

    result.map_err(|e| e.to_string().into())
}
