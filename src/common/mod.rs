//! Shared definitions used across the daemon.

pub mod constants;
