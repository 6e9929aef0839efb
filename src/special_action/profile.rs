use std::{collections::HashMap, sync::RwLock};

use thiserror::Error;

use crate::{config::Settings, identity::normalize};

use super::{ActionLookup, SpecialAction};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
    #[error("Profile store lock poisoned")]
    Poisoned,
}

/// Special action profiles and which controller uses which one
pub struct ProfileStore {
    profiles: HashMap<String, Vec<SpecialAction>>,
    /// Normalized controller key to profile name
    assignments: RwLock<HashMap<String, String>>,
    default_profile: Option<String>,
}

impl ProfileStore {
    pub fn new(settings: &Settings) -> Self {
        let profiles = settings
            .profiles
            .iter()
            .map(|profile| (profile.name.clone(), profile.special_actions.clone()))
            .collect();
        let assignments = settings
            .controllers
            .iter()
            .map(|(key, profile)| (normalize(key), profile.clone()))
            .collect();

        Self {
            profiles,
            assignments: RwLock::new(assignments),
            default_profile: settings.default_profile.clone(),
        }
    }

    /// Returns the name of the profile used by the given controller
    pub fn profile_for(&self, key: &str) -> Option<String> {
        let assigned = self
            .assignments
            .read()
            .ok()
            .and_then(|assignments| assignments.get(&normalize(key)).cloned());
        assigned.or_else(|| self.default_profile.clone())
    }

    /// Assign a profile to the given controller. Callers are responsible for
    /// telling the engine the profile changed.
    pub fn assign(&self, key: &str, profile: &str) -> Result<(), ProfileError> {
        if !self.profiles.contains_key(profile) {
            return Err(ProfileError::UnknownProfile(profile.to_string()));
        }
        let mut assignments = self
            .assignments
            .write()
            .map_err(|_| ProfileError::Poisoned)?;
        log::info!("Assigning profile '{profile}' to {key}");
        assignments.insert(normalize(key), profile.to_string());
        Ok(())
    }
}

impl ActionLookup for ProfileStore {
    fn actions_for(&self, profile_key: &str) -> Vec<SpecialAction> {
        let Some(name) = self.profile_for(profile_key) else {
            return Vec::new();
        };
        self.profiles.get(&name).cloned().unwrap_or_default()
    }
}
