//! Media session control.
//!
//! Discovering sessions and sending transport commands is done by the
//! platform. The timer only needs the [`MediaController`] capability: it
//! lists sessions for display and sends `Stop` to every session when a run
//! completes or a sleep fade ends.

mod error;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use error::MediaError;

// ============================================================================
// Types
// ============================================================================

/// Playback status of a media session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    Buffering,
    #[default]
    None,
}

/// An active media session as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSession {
    /// Stable id assigned when the session was first seen
    pub id: u32,
    /// Package that owns the session
    pub package_id: String,
    /// Display name of the owning app
    pub app_name: String,
    /// Track title
    pub title: String,
    /// Track artist
    pub artist: String,
    /// Current playback status
    pub playback: PlaybackStatus,
    /// Track length in millis
    pub duration_millis: u64,
    /// Playback position in millis, never beyond `duration_millis`
    pub position_millis: u64,
}

impl MediaSession {
    /// Returns true if the session is audible or about to be.
    pub fn is_playing(&self) -> bool {
        matches!(
            self.playback,
            PlaybackStatus::Playing | PlaybackStatus::Buffering
        )
    }
}

/// Which sessions a command applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaTarget {
    /// Every active session
    All,
    /// Sessions owned by one package
    Package(String),
}

impl fmt::Display for MediaTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaTarget::All => f.write_str("all"),
            MediaTarget::Package(id) => f.write_str(id),
        }
    }
}

/// Transport command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCommand {
    Play,
    Pause,
    Stop,
}

// ============================================================================
// MediaController
// ============================================================================

/// Capability for listing and controlling media sessions.
pub trait MediaController: Send + Sync {
    /// Lists the currently known sessions.
    fn list(&self) -> Result<Vec<MediaSession>, MediaError>;

    /// Sends a transport command.
    fn control(&self, target: MediaTarget, command: MediaCommand) -> Result<(), MediaError>;
}

/// Controller for hosts without media session access.
///
/// Commands are logged and otherwise ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMediaController;

impl MediaController for LoggingMediaController {
    fn list(&self) -> Result<Vec<MediaSession>, MediaError> {
        Ok(Vec::new())
    }

    fn control(&self, target: MediaTarget, command: MediaCommand) -> Result<(), MediaError> {
        info!(%target, ?command, "media command");
        Ok(())
    }
}

// ============================================================================
// MockMediaController
// ============================================================================

/// Mock media controller for testing.
#[derive(Debug, Default)]
pub struct MockMediaController {
    sessions: Mutex<Vec<MediaSession>>,
    commands: Mutex<Vec<(MediaTarget, MediaCommand)>>,
    should_fail: AtomicBool,
}

impl MockMediaController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sessions(&self, sessions: Vec<MediaSession>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn commands(&self) -> Vec<(MediaTarget, MediaCommand)> {
        self.commands.lock().unwrap().clone()
    }

    #[must_use]
    pub fn stop_all_count(&self) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, command)| *target == MediaTarget::All && *command == MediaCommand::Stop)
            .count()
    }

    pub fn reset(&self) {
        self.commands.lock().unwrap().clear();
    }
}

impl MediaController for MockMediaController {
    fn list(&self) -> Result<Vec<MediaSession>, MediaError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(MediaError::AccessDenied);
        }
        Ok(self.sessions.lock().unwrap().clone())
    }

    fn control(&self, target: MediaTarget, command: MediaCommand) -> Result<(), MediaError> {
        self.commands.lock().unwrap().push((target, command));
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(MediaError::CommandFailed("simulated failure".to_string()));
        }
        Ok(())
    }
}
