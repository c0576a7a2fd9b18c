//! Media Timer Library
//!
//! A sleep timer that stops media playback when a countdown ends.
//! It includes:
//! - Timer engine actor that owns the countdown state
//! - Sleep mode that fades volume and brightness toward the end
//! - State mirror that reconciles persisted runs for UIs
//! - Planner for recurring scheduled timers
//! - Settings store with JSON file and in-memory backends
//! - Capability traits for media sessions, volume, brightness and haptics
//! - CLI command parsing and display utilities

pub mod cli;
pub mod clock;
pub mod daemon;
pub mod device;
pub mod media;
pub mod mirror;
pub mod schedule;
pub mod settings;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    DayOfWeek, ScheduledTimerDefinition, SleepModeSettings, SleepModeState, TimerState,
};

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};

pub use daemon::{Capabilities, EngineConfig, SleepFadeController, TimerError, TimerEvent, TimerHandle};

pub use mirror::TimerStateMirror;

pub use media::{MediaCommand, MediaController, MediaError, MediaSession, MediaTarget};

pub use device::{DeviceBrightness, DeviceError, DeviceVolume, Haptics};

pub use schedule::{
    next_trigger, AlarmDispatcher, AlarmScheduler, ScheduleError, ScheduledTimerPlanner,
    TokioAlarmScheduler,
};

pub use settings::{
    JsonFileSettingsStore, MemorySettingsStore, SettingKey, SettingValue, SettingsError,
    SettingsStore, SettingsStoreExt,
};
