//! Write-behind persistence of the run's end time.
//!
//! The engine never waits on storage. End times are queued to a writer task
//! that applies them in order on the blocking pool; a failed write is logged
//! and the in-memory state stays as it is.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::settings::{SettingKey, SettingValue, SettingsStore};

/// Handle to the end-time writer task.
#[derive(Debug, Clone)]
pub(crate) struct EndTimePersister {
    tx: mpsc::UnboundedSender<i64>,
}

impl EndTimePersister {
    /// Spawns the writer task. Must be called inside a tokio runtime.
    pub(crate) fn spawn(settings: Arc<dyn SettingsStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();

        tokio::spawn(async move {
            while let Some(end_time) = rx.recv().await {
                // One write at a time, on the blocking pool.
                let store = Arc::clone(&settings);
                let written = tokio::task::spawn_blocking(move || {
                    store.set(SettingKey::EndTimeMillis, SettingValue::Long(end_time))
                })
                .await;

                match written {
                    Ok(Ok(())) => debug!(end_time, "persisted end time"),
                    Ok(Err(e)) => warn!(end_time, error = %e, "failed to persist end time"),
                    Err(e) => warn!(end_time, error = %e, "end time write task failed"),
                }
            }
        });

        Self { tx }
    }

    /// Queues an end time. `0` clears it.
    pub(crate) fn persist(&self, end_time: i64) {
        if self.tx.send(end_time).is_err() {
            warn!(end_time, "end time writer stopped, value dropped");
        }
    }
}
