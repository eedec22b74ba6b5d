//! Capabilities the state machine needs from the bedside hardware.
//!
//! Real drivers (infrared presence sensor, environment board, smart-light
//! bridge) live outside this crate and plug in through these traits. The
//! detached adapters below let the daemon run on a machine without any of
//! them attached.

use anyhow::Result;
use std::time::Duration;
use thiserror::Error;

/// Raw gyroscope reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionVector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Sum of absolute per-axis differences.
    pub fn distance(&self, other: &MotionVector) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor not attached")]
    NotAttached,

    #[error("sensor read failed: {0}")]
    Read(String),
}

/// Polled environment board.
#[cfg_attr(test, mockall::automock)]
pub trait EnvironmentSensor: Send {
    /// Degrees Celsius.
    fn temperature(&mut self) -> Result<f64, SensorError>;
    /// Millibar.
    fn pressure(&mut self) -> Result<f64, SensorError>;
    /// Relative humidity in percent.
    fn humidity(&mut self) -> Result<f64, SensorError>;
    fn movement_vector(&mut self) -> Result<MotionVector, SensorError>;
}

/// Called with the new sensor level on every presence edge.
pub type EdgeCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Interrupt-driven presence sensor.
#[cfg_attr(test, mockall::automock)]
pub trait PresenceSensor: Send + Sync {
    /// Current level; `true` while presence is detected.
    fn read(&self) -> bool;

    /// Install the edge callback. Drivers call it from their own thread.
    fn on_edge(&self, callback: EdgeCallback);
}

/// Dimmable light used for the wake ramp.
#[cfg_attr(test, mockall::automock)]
pub trait LightActuator: Send {
    fn set(&mut self, on: bool, intensity: u16, transition: Duration) -> Result<()>;
}

/// Stand-in for a missing environment board.
#[derive(Debug, Default)]
pub struct DetachedEnvironment;

impl EnvironmentSensor for DetachedEnvironment {
    fn temperature(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::NotAttached)
    }

    fn pressure(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::NotAttached)
    }

    fn humidity(&mut self) -> Result<f64, SensorError> {
        Err(SensorError::NotAttached)
    }

    fn movement_vector(&mut self) -> Result<MotionVector, SensorError> {
        Err(SensorError::NotAttached)
    }
}

/// Presence sensor that never fires.
#[derive(Debug, Default)]
pub struct DetachedPresence;

impl PresenceSensor for DetachedPresence {
    fn read(&self) -> bool {
        false
    }

    fn on_edge(&self, _callback: EdgeCallback) {
        log_indented!("No presence sensor attached, sleep cycles will not start");
    }
}

/// Light that only reports what it would do.
#[derive(Debug, Default)]
pub struct LoggingLight {
    debug_enabled: bool,
}

impl LoggingLight {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }
}

impl LightActuator for LoggingLight {
    fn set(&mut self, on: bool, intensity: u16, transition: Duration) -> Result<()> {
        if self.debug_enabled {
            log_debug!(
                "Light {} at {intensity} over {}ms",
                if on { "on" } else { "off" },
                transition.as_millis()
            );
        }
        Ok(())
    }
}
