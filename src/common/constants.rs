//! Application-wide defaults and limits.
//!
//! Defaults apply whenever the configuration file leaves a field out. The
//! `MINIMUM_*`/`MAXIMUM_*` pairs are the hard limits enforced by
//! `config::validation`.

// # Server connection

pub const DEFAULT_SERVER_ADDRESS: &str = "ws://192.168.1.2:8777";
pub const DEFAULT_HARDWARE_ID: &str = "7c222fb2927d828af22f592134e89324";
pub const DEFAULT_CONNECTION_HOLDOFF: u64 = 10; // seconds
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 0; // seconds, 0 = disabled

/// How long a session waits for an inbound frame before it services the
/// outbound queue again.
pub const SESSION_POLL_INTERVAL_MS: u64 = 100;

/// Outbound queue capacity; beyond this, new messages are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1 << 14;

// # Sleep-cycle state machine

pub const DEFAULT_READY_TO_IDLE_TIMEOUT: u64 = 3 * 60; // seconds
pub const DEFAULT_READY_TO_RECORDING_TIMEOUT: u64 = 5 * 60; // seconds
pub const DEFAULT_PAUSED_TO_IDLE_TIMEOUT: u64 = 10 * 60; // seconds
pub const DEFAULT_RESUME_DEBOUNCE: u64 = 2; // seconds
pub const MAXIMUM_STATE_TIMEOUT: u64 = 24 * 60 * 60;

pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 0.04;
pub const DEFAULT_NORMALIZING_MOVEMENT_POLLS: u32 = 1;

pub const DEFAULT_MOVEMENT_POLL_INTERVAL: u64 = 1; // seconds
pub const DEFAULT_TEMPERATURE_POLL_INTERVAL: u64 = 10 * 60; // seconds
pub const DEFAULT_PRESSURE_POLL_INTERVAL: u64 = 10 * 60; // seconds
pub const DEFAULT_HUMIDITY_POLL_INTERVAL: u64 = 10 * 60; // seconds
pub const DEFAULT_POLL_CADENCE_MS: u64 = 1000;
pub const MINIMUM_POLL_CADENCE_MS: u64 = 10;
pub const MAXIMUM_POLL_CADENCE_MS: u64 = 10_000;

// # Light

pub const DEFAULT_MAX_LIGHT_INTENSITY: u16 = 255;
pub const MINIMUM_MAX_LIGHT_INTENSITY: u16 = 1;
pub const MAXIMUM_MAX_LIGHT_INTENSITY: u16 = 1000;
pub const DEFAULT_LIGHT_OFF_TRANSITION: u64 = 10; // seconds
pub const WAKE_LIGHT_STEP_TRANSITION_MS: u64 = 100;

// # Waking

pub const DEFAULT_WAKE_DURATION: u64 = 15; // minutes
pub const MINIMUM_WAKE_DURATION: u64 = 1;
pub const MAXIMUM_WAKE_DURATION: u64 = 240;
pub const DEFAULT_WAKE_CHECK_INTERVAL: u64 = 10; // seconds
pub const MINIMUM_WAKE_CHECK_INTERVAL: u64 = 1;
pub const MAXIMUM_WAKE_CHECK_INTERVAL: u64 = 300;
pub const DEFAULT_WAKE_RAMP_TICK_MS: u64 = 1000;

// # Exit codes

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
