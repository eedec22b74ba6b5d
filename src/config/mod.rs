//! Configuration system for deep-slumber.
//!
//! This module handles loading, validating and resolving the daemon settings
//! from the TOML configuration file. Every key is optional; anything left out
//! falls back to the defaults in [`crate::common::constants`].
//!
//! ## Configuration Sources
//!
//! 1. **Explicit path**: `deep-slumber --config <file>`
//! 2. **Default path**: `$XDG_CONFIG_HOME/deep-slumber/deep-slumber.toml`
//!    (usually `~/.config/deep-slumber/deep-slumber.toml`)
//!
//! If the default file does not exist a commented default configuration is
//! written there and loaded. An explicit path must exist.
//!
//! ## Module Structure
//!
//! - [`loading`]: locating, reading and parsing the file
//! - [`validation`]: rejecting values the daemon cannot run with
//! - [`builder`]: writing the commented default file
//!
//! ## Example Configuration
//!
//! ```toml
//! #[Connection]
//! server_address = "ws://192.168.1.2:8777"
//! hardware_id = "7c222fb2927d828af22f592134e89324"
//! connection_holdoff = 10
//! heartbeat_interval = 0
//!
//! #[Presence timeouts]
//! ready_to_idle_timeout = 180
//! ready_to_recording_timeout = 300
//! paused_to_idle_timeout = 600
//! resume_debounce = 2
//!
//! #[Sensors]
//! movement_threshold = 0.04
//! normalizing_movement_polls = 1
//! movement_poll_interval = 1
//! poll_cadence_ms = 1000
//!
//! #[Wake light]
//! max_light_intensity = 255
//! default_wake_duration = 15
//! ```

pub mod builder;
pub mod loading;
pub mod validation;

use serde::Deserialize;
use std::time::Duration;

use crate::common::constants::*;
use crate::orchestra::OrchestraConfig;
use crate::orchestra::polling::PollIntervals;
use crate::outpost::OutpostConfig;
use crate::risenshine::WakeConfig;

pub use builder::create_default_config;
pub use loading::{get_config_path, load, load_from_path};

/// Raw configuration as read from `deep-slumber.toml`.
///
/// All durations are whole seconds unless the key name says otherwise
/// (`poll_cadence_ms`) or the documentation below states minutes.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// WebSocket endpoint of the recording server. Only `ws://` is supported.
    pub server_address: Option<String>,
    /// Identifier announced in the Hello message and stamped on every event.
    pub hardware_id: Option<String>,
    pub connection_holdoff: Option<u64>,
    /// Outbound heartbeat cadence, 0 disables heartbeats.
    pub heartbeat_interval: Option<u64>,

    pub ready_to_idle_timeout: Option<u64>,
    pub ready_to_recording_timeout: Option<u64>,
    pub paused_to_idle_timeout: Option<u64>,
    /// Minimum time a person must be present again before a paused recording
    /// resumes.
    pub resume_debounce: Option<u64>,

    /// Movement difference that counts as "the bed is being used".
    pub movement_threshold: Option<f64>,
    pub normalizing_movement_polls: Option<u32>,
    pub movement_poll_interval: Option<u64>,
    pub temperature_poll_interval: Option<u64>,
    pub pressure_poll_interval: Option<u64>,
    pub humidity_poll_interval: Option<u64>,
    pub poll_cadence_ms: Option<u64>,

    pub max_light_intensity: Option<u16>,
    pub light_off_transition: Option<u64>,
    /// Wake ramp length in minutes when the server sends no window.
    pub default_wake_duration: Option<u64>,
    pub wake_check_interval: Option<u64>,
}

impl Config {
    pub fn server_address(&self) -> &str {
        self.server_address
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_ADDRESS)
    }

    pub fn hardware_id(&self) -> &str {
        self.hardware_id.as_deref().unwrap_or(DEFAULT_HARDWARE_ID)
    }

    /// Transport settings resolved against the defaults.
    pub fn outpost_config(&self, debug_enabled: bool) -> OutpostConfig {
        let heartbeat = self
            .heartbeat_interval
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);

        OutpostConfig {
            hardware_id: self.hardware_id().to_string(),
            connection_holdoff: Duration::from_secs(
                self.connection_holdoff.unwrap_or(DEFAULT_CONNECTION_HOLDOFF),
            ),
            heartbeat_interval: (heartbeat > 0).then(|| Duration::from_secs(heartbeat)),
            debug_enabled,
            ..OutpostConfig::default()
        }
    }

    /// State machine settings resolved against the defaults.
    pub fn orchestra_config(&self, debug_enabled: bool) -> OrchestraConfig {
        let secs = |value: Option<u64>, default: u64| Duration::from_secs(value.unwrap_or(default));

        OrchestraConfig {
            ready_to_idle_timeout: secs(self.ready_to_idle_timeout, DEFAULT_READY_TO_IDLE_TIMEOUT),
            ready_to_recording_timeout: secs(
                self.ready_to_recording_timeout,
                DEFAULT_READY_TO_RECORDING_TIMEOUT,
            ),
            paused_to_idle_timeout: secs(
                self.paused_to_idle_timeout,
                DEFAULT_PAUSED_TO_IDLE_TIMEOUT,
            ),
            resume_debounce: secs(self.resume_debounce, DEFAULT_RESUME_DEBOUNCE),
            movement_threshold: self
                .movement_threshold
                .unwrap_or(DEFAULT_MOVEMENT_THRESHOLD),
            normalizing_movement_polls: self
                .normalizing_movement_polls
                .unwrap_or(DEFAULT_NORMALIZING_MOVEMENT_POLLS),
            poll_intervals: PollIntervals {
                temperature: secs(
                    self.temperature_poll_interval,
                    DEFAULT_TEMPERATURE_POLL_INTERVAL,
                ),
                pressure: secs(self.pressure_poll_interval, DEFAULT_PRESSURE_POLL_INTERVAL),
                humidity: secs(self.humidity_poll_interval, DEFAULT_HUMIDITY_POLL_INTERVAL),
                movement: secs(self.movement_poll_interval, DEFAULT_MOVEMENT_POLL_INTERVAL),
            },
            poll_cadence: Duration::from_millis(
                self.poll_cadence_ms.unwrap_or(DEFAULT_POLL_CADENCE_MS),
            ),
            max_light_intensity: self
                .max_light_intensity
                .unwrap_or(DEFAULT_MAX_LIGHT_INTENSITY),
            light_off_transition: secs(self.light_off_transition, DEFAULT_LIGHT_OFF_TRANSITION),
            autopoll: true,
            debug_enabled,
        }
    }

    /// Wake scheduler settings resolved against the defaults.
    pub fn wake_config(&self, debug_enabled: bool) -> WakeConfig {
        WakeConfig {
            default_wake_duration: Duration::from_secs(
                self.default_wake_duration.unwrap_or(DEFAULT_WAKE_DURATION) * 60,
            ),
            wake_check_interval: Duration::from_secs(
                self.wake_check_interval
                    .unwrap_or(DEFAULT_WAKE_CHECK_INTERVAL),
            ),
            debug_enabled,
            ..WakeConfig::default()
        }
    }

    /// Print the effective configuration.
    pub fn log_config(&self, source: &str) {
        let orchestra = self.orchestra_config(false);
        let wake = self.wake_config(false);

        log_block_start!("Loaded configuration from {source}");
        log_indented!("Server: {}", self.server_address());
        log_indented!("Hardware id: {}", self.hardware_id());
        log_indented!(
            "Connection holdoff: {}s",
            self.connection_holdoff.unwrap_or(DEFAULT_CONNECTION_HOLDOFF)
        );
        match self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL) {
            0 => log_indented!("Heartbeat: off"),
            secs => log_indented!("Heartbeat: every {secs}s"),
        }
        log_indented!(
            "Timeouts: ready->idle {}s, ready->recording {}s, paused->idle {}s",
            orchestra.ready_to_idle_timeout.as_secs(),
            orchestra.ready_to_recording_timeout.as_secs(),
            orchestra.paused_to_idle_timeout.as_secs()
        );
        log_indented!("Resume debounce: {}s", orchestra.resume_debounce.as_secs());
        log_indented!(
            "Movement threshold: {} after {} normalizing poll(s)",
            orchestra.movement_threshold,
            orchestra.normalizing_movement_polls
        );
        log_indented!(
            "Poll intervals: movement {}s, temperature {}s, pressure {}s, humidity {}s",
            orchestra.poll_intervals.movement.as_secs(),
            orchestra.poll_intervals.temperature.as_secs(),
            orchestra.poll_intervals.pressure.as_secs(),
            orchestra.poll_intervals.humidity.as_secs()
        );
        log_indented!("Poll cadence: {}ms", orchestra.poll_cadence.as_millis());
        log_indented!(
            "Light: max intensity {}, off transition {}s",
            orchestra.max_light_intensity,
            orchestra.light_off_transition.as_secs()
        );
        log_indented!(
            "Wake: default duration {}min, check every {}s",
            wake.default_wake_duration.as_secs() / 60,
            wake.wake_check_interval.as_secs()
        );
    }
}
