//! # deep-slumber
//!
//! Library behind the `deep-slumber` bedside daemon.
//!
//! This library exists to enable testing of the internals and to keep CLI
//! dispatch (main.rs) separate from application logic.
//!
//! ## Architecture
//!
//! - **Entry Point**: [`DeepSlumber`] loads configuration, installs signal
//!   handlers and runs the [`Appliance`] until shutdown
//! - **Transport**: `outpost` keeps the WebSocket connection to the server,
//!   queues outbound messages and dispatches inbound ones
//! - **Events**: `bus` fans domain events out to their consumers
//! - **Sleep cycle**: `orchestra` turns presence edges and sensor samples into
//!   the IDLE/READY/RECORDING/PAUSED state machine
//! - **Waking**: `risenshine` schedules the sunrise light ramp from server
//!   settings
//! - **Infrastructure**: configuration, signal handling, timers, clocks and
//!   logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

// Public API modules
pub mod args;
pub mod bus;
pub mod common;
pub mod config;
pub mod orchestra;
pub mod outpost;
pub mod risenshine;
pub mod signals;
pub mod time_source;
pub mod timers;

mod slumber;

#[cfg(any(test, feature = "testing-support"))]
pub mod testing;

pub use slumber::{Appliance, DeepSlumber, Hardware, Runtime, config_path_from_arg};
