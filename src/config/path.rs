//! Module for searching for dualsense-hub config files

use std::path::PathBuf;

/// Base system fallback path to use if one cannot be found with XDG
const FALLBACK_BASE_PATH: &str = "/usr/share/dualsense-hub";
const SETTINGS_FILE: &str = "settings.yaml";

/// Returns the base path for configuration data
pub fn get_base_path() -> PathBuf {
    let Ok(base_dirs) = xdg::BaseDirectories::with_prefix("dualsense-hub") else {
        log::warn!("Unable to determine config base path. Using fallback path.");
        return PathBuf::from(FALLBACK_BASE_PATH);
    };

    // Get the data directories in preference order
    let data_dirs = base_dirs.get_data_dirs();
    for dir in data_dirs {
        if dir.exists() {
            return dir;
        }
    }

    log::warn!("Config base path not found. Using fallback path.");
    PathBuf::from(FALLBACK_BASE_PATH)
}

/// Returns the list of settings file locations in load order.
/// E.g. ["~/.config/dualsense-hub/settings.yaml", "/etc/dualsense-hub/settings.yaml"]
pub fn get_settings_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(base_dirs) = xdg::BaseDirectories::with_prefix("dualsense-hub") {
        paths.push(base_dirs.get_config_home().join(SETTINGS_FILE));
    }
    paths.push(PathBuf::from("/etc/dualsense-hub").join(SETTINGS_FILE));
    paths.push(PathBuf::from("./rootfs/usr/share/dualsense-hub").join(SETTINGS_FILE));
    paths.push(get_base_path().join(SETTINGS_FILE));

    paths
}

/// Returns the first settings file that exists
pub fn find_settings_file() -> Option<PathBuf> {
    get_settings_paths().into_iter().find(|path| {
        log::trace!("Checking for settings at {path:?}");
        path.is_file()
    })
}
