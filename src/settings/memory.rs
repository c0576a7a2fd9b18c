//! In-process settings store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{change_channel, SettingChange, SettingKey, SettingValue, SettingsError, SettingsMap, SettingsStore};

/// Settings held in memory.
///
/// Used by tests and by hosts that do not persist settings. Writes can be
/// made to fail with [`MemorySettingsStore::set_should_fail`].
#[derive(Debug)]
pub struct MemorySettingsStore {
    values: Mutex<SettingsMap>,
    changes: broadcast::Sender<SettingChange>,
    should_fail: AtomicBool,
    set_count: AtomicUsize,
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Mutex::new(SettingsMap::default()),
            changes: change_channel(),
            should_fail: AtomicBool::new(false),
            set_count: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent `set` fail with a backend error.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.set_count.load(Ordering::SeqCst)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: SettingKey) -> Result<SettingValue, SettingsError> {
        let values = self
            .values
            .lock()
            .map_err(|_| SettingsError::Backend("settings lock poisoned".to_string()))?;
        Ok(values.get(key))
    }

    fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), SettingsError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(SettingsError::Backend("simulated failure".to_string()));
        }

        let changes = {
            let mut values = self
                .values
                .lock()
                .map_err(|_| SettingsError::Backend("settings lock poisoned".to_string()))?;
            values.apply(key, value)?
        };
        self.set_count.fetch_add(1, Ordering::SeqCst);

        for change in changes {
            let _ = self.changes.send(change);
        }
        Ok(())
    }

    fn observe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }
}
