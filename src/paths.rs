//! Centralized path definitions for configuration files.
//!
//! Functions accept `&Path` so they work for any host (GUI shell or CLI).

use std::path::{Path, PathBuf};

pub const APP_ID: &str = "gooey-forms";

pub const SETTINGS_FILE: &str = "settings.json";
pub const SUITE_FILE: &str = "suite.json";

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn suite_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SUITE_FILE)
}

/// Default config directory when the host does not supply one:
/// `$XDG_CONFIG_HOME/gooey-forms`, falling back to `$HOME/.config/gooey-forms`.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(APP_ID));
    }
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join(APP_ID))
}
