//! Settings persisted as a JSON object.
//!
//! The whole map is rewritten on every `set`. Unknown keys and values of the
//! wrong kind found on load are logged and skipped so a hand-edited file
//! never prevents startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{
    change_channel, SettingChange, SettingKey, SettingValue, SettingsError, SettingsMap,
    SettingsStore,
};

/// Application directory name under the user config dir.
const APP_DIR: &str = "media-timer";

/// Settings file name.
const FILE_NAME: &str = "settings.json";

/// JSON file backed settings store.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: Mutex<SettingsMap>,
    changes: broadcast::Sender<SettingChange>,
}

impl JsonFileSettingsStore {
    /// Default settings path: `<config dir>/media-timer/settings.json`.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
            .ok_or_else(|| SettingsError::Io("no user config directory".to_string()))
    }

    /// Opens the store at the default path.
    pub fn open_default() -> Result<Self, SettingsError> {
        Self::open(Self::default_path()?)
    }

    /// Opens the store at `path`. A missing file means all defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let values = if path.exists() {
            load(&path)?
        } else {
            debug!(path = %path.display(), "settings file not found, using defaults");
            SettingsMap::default()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
            changes: change_channel(),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &SettingsMap) -> Result<(), SettingsError> {
        let mut object = Map::new();
        for (key, value) in values.iter() {
            let json = serde_json::to_value(value)
                .map_err(|e| SettingsError::Serialization(e.to_string()))?;
            object.insert(key.as_str().to_string(), json);
        }
        let content = serde_json::to_string_pretty(&Value::Object(object))
            .map_err(|e| SettingsError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }
        fs::write(&self.path, content).map_err(|e| SettingsError::Io(e.to_string()))
    }
}

fn load(path: &Path) -> Result<SettingsMap, SettingsError> {
    let content = fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;
    let object: Map<String, Value> =
        serde_json::from_str(&content).map_err(|e| SettingsError::Serialization(e.to_string()))?;

    let mut values = SettingsMap::default();
    for (name, raw) in object {
        let key = match name.parse::<SettingKey>() {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "skipping settings entry");
                continue;
            }
        };
        let value: SettingValue = match serde_json::from_value(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "skipping unreadable settings value");
                continue;
            }
        };
        if let Err(e) = values.apply(key, value) {
            warn!(%key, error = %e, "skipping invalid settings value");
        }
    }
    Ok(values)
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: SettingKey) -> Result<SettingValue, SettingsError> {
        let values = self
            .values
            .lock()
            .map_err(|_| SettingsError::Backend("settings lock poisoned".to_string()))?;
        Ok(values.get(key))
    }

    fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), SettingsError> {
        let changes = {
            let mut values = self
                .values
                .lock()
                .map_err(|_| SettingsError::Backend("settings lock poisoned".to_string()))?;
            let mut updated = values.clone();
            let changes = updated.apply(key, value)?;
            self.write(&updated)?;
            *values = updated;
            changes
        };

        for change in changes {
            let _ = self.changes.send(change);
        }
        Ok(())
    }

    fn observe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }
}
