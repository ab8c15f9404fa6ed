use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ── Bridge settings ──────────────────────────────────────────────

fn default_cancel_grace_ms() -> u64 {
    3000
}

fn default_event_queue_capacity() -> usize {
    64
}

/// Tuning for the execution bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// How long a cancelled run may take to acknowledge before it is torn down.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// Capacity of the bounded worker → bridge queue of each run.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            cancel_grace_ms: default_cancel_grace_ms(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl BridgeSettings {
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Queue capacity, never zero (tokio rejects zero-capacity channels).
    pub fn queue_capacity(&self) -> usize {
        self.event_queue_capacity.max(1)
    }
}

// ── App settings ─────────────────────────────────────────────────

fn default_context_parameter() -> Option<String> {
    Some("dataset".to_string())
}

/// Application-level settings stored in the config directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    pub version: u32,
    #[serde(default)]
    pub bridge: BridgeSettings,
    /// Path controls only accept picker selections, never typed text.
    #[serde(default)]
    pub disable_manual_path_input: bool,
    /// Parameter whose value becomes the picker base directory of other path controls.
    #[serde(default = "default_context_parameter")]
    pub context_parameter: Option<String>,
}

const SETTINGS_VERSION: u32 = 1;

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            bridge: BridgeSettings::default(),
            disable_manual_path_input: false,
            context_parameter: default_context_parameter(),
        }
    }
}

/// Load settings from the config directory. Returns None if no settings file
/// exists or it cannot be parsed.
pub fn load_settings(app_config_dir: &Path) -> Option<AppSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<AppSettings>(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            None
        }
    }
}

/// Save settings to the config directory.
pub fn save_settings(app_config_dir: &Path, settings: &AppSettings) -> Result<(), AppError> {
    fs::create_dir_all(app_config_dir)?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
}

// ── JSON file helpers ────────────────────────────────────────────

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// The previous file, if any, is kept as a `.bak` sibling (best-effort).
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AppError> {
    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path: PathBuf = path.with_file_name(&tmp_name);

    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut settings = AppSettings::default();
        settings.bridge.cancel_grace_ms = 250;
        settings.disable_manual_path_input = true;
        save_settings(dir.path(), &settings).unwrap();

        let loaded = load_settings(dir.path()).expect("should load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            crate::paths::settings_path(dir.path()),
            r#"{ "version": 1 }"#,
        )
        .unwrap();

        let loaded = load_settings(dir.path()).expect("should load");
        assert_eq!(loaded.bridge, BridgeSettings::default());
        assert_eq!(loaded.context_parameter.as_deref(), Some("dataset"));
        assert!(!loaded.disable_manual_path_input);
    }

    #[test]
    fn test_missing_or_corrupt_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_settings(dir.path()).is_none());

        std::fs::write(crate::paths::settings_path(dir.path()), "{ not json").unwrap();
        assert!(load_settings(dir.path()).is_none());
    }

    #[test]
    fn test_atomic_write_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("data.json.bak")).unwrap(),
            "one"
        );
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bridge = BridgeSettings {
            cancel_grace_ms: 10,
            event_queue_capacity: 0,
        };
        assert_eq!(bridge.queue_capacity(), 1);
        assert_eq!(bridge.cancel_grace(), Duration::from_millis(10));
    }
}
