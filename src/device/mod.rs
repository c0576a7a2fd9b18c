//! Device volume, screen brightness and haptics.
//!
//! These are global OS resources. While a sleep fade is active only the
//! fader writes them, and it restores the captured values on every exit
//! path. All calls are fallible; a missing permission shows up as
//! [`DeviceError::PermissionDenied`] and must be handled by skipping the
//! affected step.
//!
//! # Implementations
//!
//! - `SoftwareVolume` / `SoftwareBrightness` / `NoHaptics`: in-memory levels
//!   for headless hosts
//! - `MockVolume` / `MockBrightness` / `MockHaptics`: recording doubles with
//!   failure injection for tests

mod error;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use error::DeviceError;

// ============================================================================
// Capabilities
// ============================================================================

/// Media stream volume in device steps (`0..=max`).
pub trait DeviceVolume: Send + Sync {
    fn get(&self) -> Result<u32, DeviceError>;
    fn set(&self, volume: u32) -> Result<(), DeviceError>;
    fn max(&self) -> Result<u32, DeviceError>;
}

/// Screen brightness normalised to `0.0..=1.0`.
pub trait DeviceBrightness: Send + Sync {
    fn get(&self) -> Result<f32, DeviceError>;
    fn set(&self, brightness: f32) -> Result<(), DeviceError>;

    /// Whether the app may write system brightness.
    fn can_write(&self) -> bool;
}

/// Haptic feedback.
pub trait Haptics: Send + Sync {
    fn vibrate(&self, duration: Duration) -> Result<(), DeviceError>;
}

// ============================================================================
// Software implementations
// ============================================================================

/// In-memory volume level.
#[derive(Debug)]
pub struct SoftwareVolume {
    level: AtomicU32,
    max: u32,
}

impl SoftwareVolume {
    #[must_use]
    pub fn new(level: u32, max: u32) -> Self {
        Self {
            level: AtomicU32::new(level.min(max)),
            max,
        }
    }
}

impl DeviceVolume for SoftwareVolume {
    fn get(&self) -> Result<u32, DeviceError> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn set(&self, volume: u32) -> Result<(), DeviceError> {
        if volume > self.max {
            return Err(DeviceError::OutOfRange {
                value: volume.to_string(),
                max: self.max.to_string(),
            });
        }
        self.level.store(volume, Ordering::SeqCst);
        Ok(())
    }

    fn max(&self) -> Result<u32, DeviceError> {
        Ok(self.max)
    }
}

/// In-memory brightness level.
#[derive(Debug)]
pub struct SoftwareBrightness {
    level: Mutex<f32>,
}

impl SoftwareBrightness {
    #[must_use]
    pub fn new(level: f32) -> Self {
        Self {
            level: Mutex::new(level.clamp(0.0, 1.0)),
        }
    }
}

impl DeviceBrightness for SoftwareBrightness {
    fn get(&self) -> Result<f32, DeviceError> {
        self.level
            .lock()
            .map(|level| *level)
            .map_err(|_| DeviceError::Unavailable("brightness lock poisoned".to_string()))
    }

    fn set(&self, brightness: f32) -> Result<(), DeviceError> {
        if !(0.0..=1.0).contains(&brightness) {
            return Err(DeviceError::OutOfRange {
                value: brightness.to_string(),
                max: "1".to_string(),
            });
        }
        let mut level = self
            .level
            .lock()
            .map_err(|_| DeviceError::Unavailable("brightness lock poisoned".to_string()))?;
        *level = brightness;
        Ok(())
    }

    fn can_write(&self) -> bool {
        true
    }
}

/// Haptics for hosts without a vibrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn vibrate(&self, _duration: Duration) -> Result<(), DeviceError> {
        Err(DeviceError::Unavailable("no vibrator".to_string()))
    }
}

// ============================================================================
// Mocks
// ============================================================================

/// Mock volume for testing.
#[derive(Debug, Default)]
pub struct MockVolume {
    level: AtomicU32,
    max: AtomicU32,
    writes: Mutex<Vec<u32>>,
    should_fail_get: AtomicBool,
    should_fail_set: AtomicBool,
}

impl MockVolume {
    #[must_use]
    pub fn new(level: u32, max: u32) -> Self {
        Self {
            level: AtomicU32::new(level),
            max: AtomicU32::new(max),
            ..Self::default()
        }
    }

    /// Simulates the user changing the volume with the hardware keys.
    pub fn set_level(&self, level: u32) {
        self.level.store(level, Ordering::SeqCst);
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn writes(&self) -> Vec<u32> {
        self.writes.lock().unwrap().clone()
    }

    pub fn set_should_fail_get(&self, should_fail: bool) {
        self.should_fail_get.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_should_fail_set(&self, should_fail: bool) {
        self.should_fail_set.store(should_fail, Ordering::SeqCst);
    }
}

impl DeviceVolume for MockVolume {
    fn get(&self) -> Result<u32, DeviceError> {
        if self.should_fail_get.load(Ordering::SeqCst) {
            return Err(DeviceError::Unavailable("simulated failure".to_string()));
        }
        Ok(self.level())
    }

    fn set(&self, volume: u32) -> Result<(), DeviceError> {
        if self.should_fail_set.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied("simulated failure".to_string()));
        }
        self.writes.lock().unwrap().push(volume);
        self.level.store(volume, Ordering::SeqCst);
        Ok(())
    }

    fn max(&self) -> Result<u32, DeviceError> {
        Ok(self.max.load(Ordering::SeqCst))
    }
}

/// Mock brightness for testing.
#[derive(Debug)]
pub struct MockBrightness {
    level: Mutex<f32>,
    writes: Mutex<Vec<f32>>,
    can_write: AtomicBool,
    should_fail_set: AtomicBool,
}

impl MockBrightness {
    #[must_use]
    pub fn new(level: f32) -> Self {
        Self {
            level: Mutex::new(level),
            writes: Mutex::new(Vec::new()),
            can_write: AtomicBool::new(true),
            should_fail_set: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn level(&self) -> f32 {
        *self.level.lock().unwrap()
    }

    #[must_use]
    pub fn writes(&self) -> Vec<f32> {
        self.writes.lock().unwrap().clone()
    }

    pub fn set_can_write(&self, can_write: bool) {
        self.can_write.store(can_write, Ordering::SeqCst);
    }

    pub fn set_should_fail_set(&self, should_fail: bool) {
        self.should_fail_set.store(should_fail, Ordering::SeqCst);
    }
}

impl DeviceBrightness for MockBrightness {
    fn get(&self) -> Result<f32, DeviceError> {
        Ok(self.level())
    }

    fn set(&self, brightness: f32) -> Result<(), DeviceError> {
        if !self.can_write() || self.should_fail_set.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied("WRITE_SETTINGS".to_string()));
        }
        self.writes.lock().unwrap().push(brightness);
        *self.level.lock().unwrap() = brightness;
        Ok(())
    }

    fn can_write(&self) -> bool {
        self.can_write.load(Ordering::SeqCst)
    }
}

/// Mock haptics for testing.
#[derive(Debug, Default)]
pub struct MockHaptics {
    vibrations: Mutex<Vec<Duration>>,
}

impl MockHaptics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn vibrate_count(&self) -> usize {
        self.vibrations.lock().unwrap().len()
    }
}

impl Haptics for MockHaptics {
    fn vibrate(&self, duration: Duration) -> Result<(), DeviceError> {
        self.vibrations.lock().unwrap().push(duration);
        Ok(())
    }
}
