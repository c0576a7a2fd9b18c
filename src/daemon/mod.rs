//! Background timer service.
//!
//! This module contains the long-lived part of the media timer:
//! - `timer`: the engine task and its [`TimerHandle`]
//! - `sleep`: the sleep mode volume and brightness fader
//! - `persist`: write-behind storage of the run's end time

mod error;
mod persist;
pub mod sleep;
pub mod timer;

use std::sync::Arc;

use crate::clock::Clock;
use crate::device::{DeviceBrightness, DeviceVolume, Haptics};
use crate::media::MediaController;
use crate::settings::SettingsStore;

pub use error::TimerError;
pub use sleep::SleepFadeController;
pub use timer::{EngineConfig, TimerEvent, TimerHandle};

/// Platform capabilities the engine is built from.
#[derive(Clone)]
pub struct Capabilities {
    pub clock: Arc<dyn Clock>,
    pub media: Arc<dyn MediaController>,
    pub settings: Arc<dyn SettingsStore>,
    pub volume: Arc<dyn DeviceVolume>,
    pub brightness: Arc<dyn DeviceBrightness>,
    pub haptics: Arc<dyn Haptics>,
}
