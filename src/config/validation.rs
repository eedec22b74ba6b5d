//! Configuration validation functionality.
//!
//! Rejects values the daemon cannot run with: unreachable endpoints, zero
//! timeouts and out-of-range light or wake settings.

use anyhow::Result;

use super::Config;
use crate::common::constants::*;

/// Check every configured value against its allowed range.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(hwid) = &config.hardware_id
        && hwid.trim().is_empty()
    {
        anyhow::bail!("hardware_id must not be empty");
    }

    if let Some(address) = &config.server_address {
        validate_server_address(address)?;
    }

    validate_positive("connection_holdoff", config.connection_holdoff)?;

    for (name, value) in [
        ("ready_to_idle_timeout", config.ready_to_idle_timeout),
        ("ready_to_recording_timeout", config.ready_to_recording_timeout),
        ("paused_to_idle_timeout", config.paused_to_idle_timeout),
    ] {
        validate_positive(name, value)?;
        if let Some(secs) = value
            && secs > MAXIMUM_STATE_TIMEOUT
        {
            anyhow::bail!(
                "{name} ({secs} seconds) must not exceed {MAXIMUM_STATE_TIMEOUT} seconds"
            );
        }
    }

    for (name, value) in [
        ("movement_poll_interval", config.movement_poll_interval),
        ("temperature_poll_interval", config.temperature_poll_interval),
        ("pressure_poll_interval", config.pressure_poll_interval),
        ("humidity_poll_interval", config.humidity_poll_interval),
    ] {
        validate_positive(name, value)?;
    }

    if let Some(threshold) = config.movement_threshold
        && !(threshold.is_finite() && threshold > 0.0)
    {
        anyhow::bail!("movement_threshold must be a positive number (got {threshold})");
    }

    if let Some(cadence) = config.poll_cadence_ms
        && !(MINIMUM_POLL_CADENCE_MS..=MAXIMUM_POLL_CADENCE_MS).contains(&cadence)
    {
        anyhow::bail!(
            "poll_cadence_ms ({cadence}) must be between {MINIMUM_POLL_CADENCE_MS} and {MAXIMUM_POLL_CADENCE_MS} milliseconds"
        );
    }

    if let Some(intensity) = config.max_light_intensity
        && !(MINIMUM_MAX_LIGHT_INTENSITY..=MAXIMUM_MAX_LIGHT_INTENSITY).contains(&intensity)
    {
        anyhow::bail!(
            "max_light_intensity ({intensity}) must be between {MINIMUM_MAX_LIGHT_INTENSITY} and {MAXIMUM_MAX_LIGHT_INTENSITY}"
        );
    }

    if let Some(minutes) = config.default_wake_duration
        && !(MINIMUM_WAKE_DURATION..=MAXIMUM_WAKE_DURATION).contains(&minutes)
    {
        anyhow::bail!(
            "default_wake_duration ({minutes} minutes) must be between {MINIMUM_WAKE_DURATION} and {MAXIMUM_WAKE_DURATION} minutes"
        );
    }

    if let Some(secs) = config.wake_check_interval
        && !(MINIMUM_WAKE_CHECK_INTERVAL..=MAXIMUM_WAKE_CHECK_INTERVAL).contains(&secs)
    {
        anyhow::bail!(
            "wake_check_interval ({secs} seconds) must be between {MINIMUM_WAKE_CHECK_INTERVAL} and {MAXIMUM_WAKE_CHECK_INTERVAL} seconds"
        );
    }

    Ok(())
}

fn validate_server_address(address: &str) -> Result<()> {
    let Some(rest) = address.strip_prefix("ws://") else {
        anyhow::bail!("server_address must start with ws:// (got \"{address}\")");
    };
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    if host.is_empty() {
        anyhow::bail!("server_address has no host (got \"{address}\")");
    }
    Ok(())
}

fn validate_positive(name: &str, value: Option<u64>) -> Result<()> {
    if value == Some(0) {
        anyhow::bail!("{name} must be greater than zero");
    }
    Ok(())
}
