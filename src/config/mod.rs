pub mod path;


use std::{collections::HashMap, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    drivers::dualsense::{DS5_VID, PIDS},
    session::DEFAULT_DISPOSE_TIMEOUT,
    special_action::{SpecialAction, DEFAULT_COMBINATION_TIMEOUT},
};

/// Represents all possible errors loading [Settings]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// Top level settings file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default)]
    pub device: DeviceMatch,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub special_actions: SpecialActionSettings,
    /// Named sets of special actions
    #[serde(default)]
    pub profiles: Vec<Profile>,
    /// Controller address (or device path) to profile name
    #[serde(default)]
    pub controllers: HashMap<String, String>,
    /// Profile used for controllers without an assignment
    pub default_profile: Option<String>,
}

impl Settings {
    /// Load [Settings] from the given YAML string
    pub fn from_yaml(content: String) -> Result<Settings, LoadError> {
        let settings: Settings = serde_yaml::from_str(content.as_str())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load [Settings] from the given YAML file
    pub fn from_yaml_file<P>(path: P) -> Result<Settings, LoadError>
    where
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path)?;
        let settings: Settings = serde_yaml::from_reader(file)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the first settings file found in the search path,
    /// or the defaults if there is none.
    pub fn load() -> Result<Settings, LoadError> {
        let Some(path) = path::find_settings_file() else {
            log::info!("No settings file found, using defaults");
            return Ok(Settings::default());
        };
        log::info!("Loading settings from {path:?}");
        Settings::from_yaml_file(path)
    }

    /// Returns the profile with the given name
    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Check that every referenced profile exists
    fn validate(&self) -> Result<(), LoadError> {
        let referenced = self
            .controllers
            .values()
            .chain(self.default_profile.iter());
        for name in referenced {
            if self.get_profile(name).is_none() {
                return Err(LoadError::Invalid(format!("Unknown profile '{name}'")));
            }
        }
        for profile in self.profiles.iter() {
            if let Some(action) = profile
                .special_actions
                .iter()
                .find(|action| action.combination.is_empty())
            {
                log::warn!(
                    "Special action '{}' in profile '{}' has no buttons and will never trigger",
                    action.id,
                    profile.name
                );
            }
        }
        Ok(())
    }
}

/// Which HID devices are managed
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DeviceMatch {
    pub vendor_id: u16,
    pub product_ids: Vec<u16>,
}

impl Default for DeviceMatch {
    fn default() -> Self {
        Self {
            vendor_id: DS5_VID,
            product_ids: PIDS.to_vec(),
        }
    }
}

impl DeviceMatch {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_ids.contains(&product_id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionSettings {
    /// How long to wait for a session's reader to stop
    pub dispose_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dispose_timeout_ms: DEFAULT_DISPOSE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SessionSettings {
    pub fn dispose_timeout(&self) -> Duration {
        Duration::from_millis(self.dispose_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SpecialActionSettings {
    /// Time without button changes after which held buttons are released
    pub combination_timeout_ms: u64,
}

impl Default for SpecialActionSettings {
    fn default() -> Self {
        Self {
            combination_timeout_ms: DEFAULT_COMBINATION_TIMEOUT.as_millis() as u64,
        }
    }
}

impl SpecialActionSettings {
    pub fn combination_timeout(&self) -> Duration {
        Duration::from_millis(self.combination_timeout_ms)
    }
}

/// A named set of special actions
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub special_actions: Vec<SpecialAction>,
}
